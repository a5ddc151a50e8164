//! HL7 Listener (§4.5): accepts MLLP connections, decodes frames, maps each
//! to a DICOM dataset, caches the order, and writes an ACK back.

use crate::cache::OrderCache;
use crate::hl7::ack::{build_ack, build_default_ack, AckCode};
use crate::hl7::{self, ParseError};
use crate::mapper::OrderMapper;
use crate::mllp;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const READ_BUFFER_SIZE: usize = 4096;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Hl7Listener {
	cache: Arc<OrderCache>,
	mapper: Arc<dyn OrderMapper>,
	listener: TcpListener,
}

impl Hl7Listener {
	/// Binds the listen socket up front so a port conflict fails startup
	/// immediately (§4.8, §7) instead of surfacing later inside a spawned
	/// task.
	pub async fn bind(
		cache: Arc<OrderCache>,
		mapper: Arc<dyn OrderMapper>,
		listen_ip: Ipv4Addr,
		listen_port: u16,
	) -> Result<Self, std::io::Error> {
		let listener = TcpListener::bind((listen_ip, listen_port)).await?;
		info!(ip = %listen_ip, port = listen_port, "HL7 listener bound");
		Ok(Self {
			cache,
			mapper,
			listener,
		})
	}

	/// Accepts connections until `cancel` fires; in-flight connections are
	/// given the same grace as the rest of the lifecycle (§4.8) by the
	/// caller.
	pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					info!("HL7 listener shutting down");
					return;
				}
				accepted = self.listener.accept() => {
					match accepted {
						Ok((stream, peer)) => {
							let span = info_span!("hl7-connection", peer = %peer);
							let this = Arc::clone(&self);
							let conn_cancel = cancel.clone();
							tokio::spawn(
								async move { this.handle_connection(stream, conn_cancel).await }
									.instrument(span),
							);
						}
						Err(err) => error!(%err, "failed to accept HL7 connection"),
					}
				}
			}
		}
	}

	async fn handle_connection(&self, mut stream: TcpStream, cancel: CancellationToken) {
		let mut decoder = mllp::Decoder::new();
		let mut buf = [0u8; READ_BUFFER_SIZE];

		loop {
			let read = tokio::select! {
				() = cancel.cancelled() => break,
				result = tokio::time::timeout(IDLE_TIMEOUT, stream.read(&mut buf)) => result,
			};

			let n = match read {
				Ok(Ok(0)) => break,
				Ok(Ok(n)) => n,
				Ok(Err(err)) => {
					warn!(%err, "connection read error");
					break;
				}
				Err(_) => {
					debug!("connection idle timeout, closing");
					break;
				}
			};

			let frames = match decoder.push(&buf[..n]) {
				Ok(frames) => frames,
				Err(err) => {
					warn!(%err, "MLLP framing error, aborting connection");
					break;
				}
			};

			for frame in frames {
				let raw = String::from_utf8_lossy(&frame).into_owned();
				let ack = self.process_message(&raw);
				let wire = mllp::encode(ack.as_bytes());
				if let Err(err) = stream.write_all(&wire).await {
					warn!(%err, "failed to write ACK");
					return;
				}
			}
		}
	}

	fn process_message(&self, raw: &str) -> String {
		let message = match hl7::parse(raw) {
			Ok(message) => message,
			Err(ParseError::Empty | ParseError::MissingMsh(_) | ParseError::TruncatedMsh) => {
				return build_default_ack("Invalid HL7 message format");
			}
		};

		if !hl7::is_supported(message.msh.message_code()) {
			return build_ack(
				&message.msh,
				AckCode::Rejected,
				Some(&format!(
					"Unsupported message type {}",
					message.msh.message_code()
				)),
			);
		}

		let dataset = match self.mapper.map(raw) {
			Ok(dataset) => dataset,
			Err(err) => {
				return build_ack(&message.msh, AckCode::Rejected, Some(&err.to_string()));
			}
		};

		let Some(_dataset) = dataset else {
			return build_ack(
				&message.msh,
				AckCode::Error,
				Some("Unable to map message to a worklist dataset"),
			);
		};

		match self.cache.put(raw) {
			Ok(id) => {
				debug!(order_id = %id, "order cached");
				build_ack(&message.msh, AckCode::Accepted, None)
			}
			Err(err) => build_ack(&message.msh, AckCode::Rejected, Some(&err.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mapper::DefaultOrderMapper;
	use tempfile::tempdir;

	async fn listener() -> Hl7Listener {
		let dir = tempdir().unwrap();
		let cache = Arc::new(OrderCache::new(dir.path(), 5).unwrap());
		Hl7Listener::bind(cache, Arc::new(DefaultOrderMapper), Ipv4Addr::LOCALHOST, 0)
			.await
			.unwrap()
	}

	const ORM: &str = "MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ORM^O01|MID1|P|2.3\rPID|||12001||Jones^John\rORC|NW|20060307110114";

	#[tokio::test]
	async fn accepted_orm_is_cached_and_acked() {
		let listener = listener().await;
		let ack = listener.process_message(ORM);
		assert!(ack.contains("MSA|AA|MID1"));
		assert_eq!(listener.cache.list().count(), 1);
	}

	#[tokio::test]
	async fn unsupported_message_type_is_rejected_without_caching() {
		let listener = listener().await;
		let raw =
			"MSH|^~\\&|HIS|MC|LIS|MC|20060307110114||ADT^A01|MID1|P|2.3\rPID|||12001||Jones^John";
		let ack = listener.process_message(raw);
		assert!(ack.contains("MSA|AR|MID1|Unsupported message type ADT"));
		assert_eq!(listener.cache.list().count(), 0);
	}

	#[tokio::test]
	async fn invalid_message_gets_default_ack() {
		let listener = listener().await;
		let ack = listener.process_message("garbage");
		assert!(ack.contains("MSA|AR||Invalid HL7 message format"));
	}
}
