//! Worklist SCP (§4.6): accepts DICOM associations proposing Verification
//! and/or Modality Worklist Information Model — FIND, answers C-ECHO-RQ
//! unconditionally, and answers C-FIND-RQ by streaming the cache through
//! the mapper and the request filter.

mod filter;

use crate::cache::OrderCache;
use crate::dimse::association::server::{ServerAssociation, ServerAssociationOptions};
use crate::dimse::association::Association;
use crate::dimse::cecho::{
	CompositeEchoRequest, CompositeEchoResponse, COMMAND_FIELD_COMPOSITE_ECHO_REQUEST,
};
use crate::dimse::cfind::{
	CompositeFindRequest, CompositeFindResponse, COMMAND_FIELD_COMPOSITE_FIND_REQUEST,
};
use crate::dimse::{DicomMessageReader, DicomMessageWriter};
use crate::mapper::OrderMapper;
use crate::types::{QueryRetrieveLevel, US};
use dicom::dictionary_std::{tags, uids};
use dicom::object::mem::InMemElement;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// DICOM status "Unable to Process", returned for C-FIND requests carrying
/// an applicable (non "not applicable") Query/Retrieve Level.
const STATUS_UNABLE_TO_PROCESS: US = 0xC000;
const STATUS_SUCCESS: US = 0x0000;
const STATUS_PENDING: US = 0xFF00;

const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WorklistScp {
	cache: Arc<OrderCache>,
	mapper: Arc<dyn OrderMapper>,
	ae_title: String,
	listener: TcpListener,
}

impl WorklistScp {
	/// Binds the listen socket up front so a port conflict fails startup
	/// immediately (§4.8, §7) instead of surfacing later inside a spawned
	/// task.
	pub async fn bind(
		cache: Arc<OrderCache>,
		mapper: Arc<dyn OrderMapper>,
		ae_title: String,
		listen_port: u16,
	) -> Result<Self, std::io::Error> {
		let address = SocketAddr::from(([0, 0, 0, 0], listen_port));
		let listener = TcpListener::bind(address).await?;
		info!(port = listen_port, ae_title = %ae_title, "Worklist SCP bound");
		Ok(Self {
			cache,
			mapper,
			ae_title,
			listener,
		})
	}

	pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					info!("Worklist SCP shutting down");
					return;
				}
				accepted = self.listener.accept() => {
					match accepted {
						Ok((stream, peer)) => {
							let span = info_span!("worklist-association", peer = %peer);
							let this = Arc::clone(&self);
							tokio::spawn(async move { this.handle_association(stream).await }.instrument(span));
						}
						Err(err) => error!(%err, "failed to accept DICOM connection"),
					}
				}
			}
		}
	}

	async fn handle_association(&self, stream: TcpStream) {
		let tcp_stream = match stream.into_std() {
			Ok(stream) => stream,
			Err(err) => {
				error!(%err, "failed to convert to std TcpStream");
				return;
			}
		};
		if let Err(err) = tcp_stream.set_nonblocking(false) {
			error!(%err, "failed to set blocking mode");
			return;
		}

		let options = ServerAssociationOptions {
			aet: self.ae_title.clone(),
			tcp_stream,
			uncompressed: true,
			abstract_syntaxes: vec![
				uids::VERIFICATION,
				uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND,
			],
		};

		let association = match ServerAssociation::new(options).await {
			Ok(association) => association,
			Err(err) => {
				warn!(%err, "failed to establish association");
				return;
			}
		};

		loop {
			let message = match association.read_message(MESSAGE_TIMEOUT).await {
				Ok(message) => message,
				Err(err) => {
					debug!(%err, "association ended");
					return;
				}
			};

			let command_field = message
				.command
				.get(tags::COMMAND_FIELD)
				.map(InMemElement::to_int::<US>)
				.and_then(Result::ok);

			match command_field {
				Some(COMMAND_FIELD_COMPOSITE_ECHO_REQUEST) => {
					self.handle_echo(&association, message).await;
				}
				Some(COMMAND_FIELD_COMPOSITE_FIND_REQUEST) => {
					self.handle_find(&association, message).await;
				}
				other => {
					warn!(?other, "unsupported command field, ending association");
					return;
				}
			}
		}
	}

	async fn handle_echo(&self, association: &ServerAssociation, message: crate::dimse::DicomMessage) {
		let presentation_context_id = message.presentation_context_id;
		let request = match CompositeEchoRequest::try_from(message) {
			Ok(request) => request,
			Err(err) => {
				warn!(%err, "malformed C-ECHO-RQ");
				return;
			}
		};

		let response = CompositeEchoResponse {
			message_id_being_responded_to: request.message_id,
			status: STATUS_SUCCESS,
		};

		if let Err(err) = association
			.write_message(response, presentation_context_id, MESSAGE_TIMEOUT)
			.await
		{
			warn!(%err, "failed to send C-ECHO-RSP");
		}
	}

	async fn handle_find(&self, association: &ServerAssociation, message: crate::dimse::DicomMessage) {
		let presentation_context_id = message.presentation_context_id;
		let request = match CompositeFindRequest::try_from(message) {
			Ok(request) => request,
			Err(err) => {
				warn!(%err, "malformed C-FIND-RQ");
				return;
			}
		};

		if qr_level_is_applicable(&request) {
			let response = CompositeFindResponse {
				message_id_being_responded_to: request.message_id,
				status: STATUS_UNABLE_TO_PROCESS,
				identifier: None,
			};
			if let Err(err) = association
				.write_message(response, presentation_context_id, MESSAGE_TIMEOUT)
				.await
			{
				warn!(%err, "failed to send C-FIND-RSP");
			}
			return;
		}

		let mut matches = 0;
		for order in self.cache.list() {
			let Ok(Some(dataset)) = self.mapper.map(&order.raw) else {
				continue;
			};
			if !filter::matches(&request.identifier, &dataset) {
				continue;
			}
			matches += 1;

			let response = CompositeFindResponse {
				message_id_being_responded_to: request.message_id,
				status: STATUS_PENDING,
				identifier: Some(dataset),
			};
			if let Err(err) = association
				.write_message(response, presentation_context_id, MESSAGE_TIMEOUT)
				.await
			{
				warn!(%err, "failed to send C-FIND-RSP");
				return;
			}
		}

		debug!(matches, "C-FIND complete");
		let terminal = CompositeFindResponse {
			message_id_being_responded_to: request.message_id,
			status: STATUS_SUCCESS,
			identifier: None,
		};
		if let Err(err) = association
			.write_message(terminal, presentation_context_id, MESSAGE_TIMEOUT)
			.await
		{
			warn!(%err, "failed to send terminal C-FIND-RSP");
		}
	}
}

/// `true` when the request's Query/Retrieve Level (0008,0052) is present
/// and names a concrete level (Patient/Study/Series/Image/Frame) — i.e.
/// "applicable" in §4.6's terms. Absent, empty, or unrecognized values are
/// treated as "not applicable", which is what a worklist request is
/// expected to send.
fn qr_level_is_applicable(request: &CompositeFindRequest) -> bool {
	request
		.identifier
		.get(tags::QUERY_RETRIEVE_LEVEL)
		.and_then(|element| element.to_str().ok())
		.is_some_and(|value| QueryRetrieveLevel::from_str(value.trim()).is_ok())
}
