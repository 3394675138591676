//! Line Reader - split standard input into lines with `read_while`.
//!
//! Each line is returned as a slice of the reader's cache, so no bytes are
//! copied unless a line spans two fetches.
//!
//! # Running
//!
//! ```sh
//! printf 'alpha\nbeta\n\ngamma' | cargo run --example line_reader
//! ```

use framewire::source::StreamSource;
use framewire::BufferedReader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut reader = BufferedReader::new(StreamSource::new(tokio::io::stdin()), 64)?;

    let mut count = 0usize;
    loop {
        let line = reader.read_while(|b| b != b'\n').await?;
        let newline = reader.read(1).await?;
        if line.is_empty() && newline.is_empty() {
            break;
        }

        count += 1;
        println!("{:>4} {:>5}B  {}", count, line.len(), String::from_utf8_lossy(&line));
    }

    tracing::info!(lines = count, bytes = reader.position(), "input exhausted");
    Ok(())
}
