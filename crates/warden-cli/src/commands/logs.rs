use std::{
    io::{self, SeekFrom},
    path::Path,
    process::ExitCode,
};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use warden_config::{Config, ConfigError};

use crate::logger::Logger;

const CHUNK_SIZE: u64 = 8 * 1024;

pub async fn logs(config: &Config, service: &str, lines: usize, logger: &mut Logger) -> Result<ExitCode> {
    let spec = config
        .services
        .get(service)
        .ok_or_else(|| ConfigError::UnknownService(service.to_owned()))?;

    let bytes = match read_tail(&spec.log_path, lines, CHUNK_SIZE).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            logger.system(&format!("no log yet at {}", spec.log_path.display()));
            return Ok(ExitCode::SUCCESS);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("cannot read {}", spec.log_path.display()))
        }
    };

    let text = String::from_utf8_lossy(&bytes);
    logger.raw(tail(&text, lines));
    Ok(ExitCode::SUCCESS)
}

/// Reads `path` backwards in `chunk`-sized blocks until the buffer holds more
/// than `lines` newlines or the start of the file is reached.
async fn read_tail(path: &Path, lines: usize, chunk: u64) -> io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    let mut buf = Vec::new();

    while pos > 0 && newlines(&buf) <= lines {
        let step = chunk.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos)).await?;

        let mut block = vec![0; usize::try_from(step).map_err(io::Error::other)?];
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&buf);
        buf = block;
    }

    Ok(buf)
}

fn newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| **b == b'\n').count()
}

/// The last `n` lines of `text`, without a trailing newline.
fn tail(text: &str, n: usize) -> &str {
    let text = text.trim_end_matches('\n');
    if n == 0 {
        return "";
    }
    match text.match_indices('\n').rev().nth(n - 1) {
        Some((idx, _)) => &text[idx + 1..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use super::*;

    #[test]
    fn tail_keeps_the_last_lines() {
        let text = "one\ntwo\nthree\n";

        assert_eq!(tail(text, 2), "two\nthree");
        assert_eq!(tail(text, 3), "one\ntwo\nthree");
        assert_eq!(tail(text, 10), "one\ntwo\nthree");
        assert_eq!(tail(text, 0), "");
        assert_eq!(tail("", 5), "");
    }

    #[tokio::test]
    async fn reads_only_the_end_of_a_long_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("math.log");
        let mut text = String::new();
        for i in 0..10_000 {
            let _ = writeln!(text, "request {i} served");
        }
        std::fs::write(&path, &text).unwrap();

        let bytes = read_tail(&path, 3, 64).await.unwrap();

        assert!(bytes.len() < 256);
        let read = String::from_utf8_lossy(&bytes);
        assert_eq!(
            tail(&read, 3),
            "request 9997 served\nrequest 9998 served\nrequest 9999 served"
        );
    }

    #[tokio::test]
    async fn short_log_is_read_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        std::fs::write(&path, "one\ntwo").unwrap();

        let bytes = read_tail(&path, 50, 4).await.unwrap();

        assert_eq!(bytes, b"one\ntwo");
        assert_eq!(tail(&String::from_utf8_lossy(&bytes), 50), "one\ntwo");
    }

    #[tokio::test]
    async fn missing_log_is_not_found() {
        let dir = tempfile::tempdir().unwrap();

        let err = read_tail(&dir.path().join("nope.log"), 5, CHUNK_SIZE)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
