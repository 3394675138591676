//! Chunked File - stream a file as a chunked HTTP/1.1 response.
//!
//! This example demonstrates:
//! - Reading a file in fixed-size pieces with `BufferedReader`
//! - Framing each piece as a chunk with `ResponseEncoder`
//! - Waiting on a single promise that covers all sub-writes of a chunk
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=framewire=trace cargo run --example chunked_file -- Cargo.toml
//! ```

use bytes::Bytes;
use framewire::http::header::CONTENT_TYPE;
use framewire::http::{HeaderMap, HeaderValue, Part, ResponseEncoder, ResponseHead, StatusCode};
use framewire::source::FileSource;
use framewire::writer::spawn_writer_task_default;
use framewire::{write_promise, BufferedReader};

const PIECE: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "Cargo.toml".into());
    let source = FileSource::open(&path).await?;
    let mut reader = BufferedReader::new(source, 4 * PIECE)?;

    let (mut out, task) = spawn_writer_task_default(tokio::io::stdout());
    let mut encoder = ResponseEncoder::new();

    let head = ResponseHead::new(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    encoder.encode(Part::Head(head), None, &mut out);

    let mut total = 0u64;
    loop {
        let piece = reader.read(PIECE).await?;
        if piece.is_empty() {
            break;
        }
        total += piece.len() as u64;

        let (promise, written) = write_promise();
        encoder.encode(Part::Body(piece), Some(promise), &mut out);
        written.await?;
    }

    let mut trailers = HeaderMap::new();
    trailers.insert("x-content-bytes", HeaderValue::from(total));
    let (promise, finished) = write_promise();
    encoder.encode(Part::End(Some(trailers)), Some(promise), &mut out);
    finished.await?;

    encoder.encode(Bytes::from_static(b"\n"), None, &mut out);
    drop(out);
    task.await??;

    tracing::info!(path = %path, bytes = total, "response written");
    Ok(())
}
