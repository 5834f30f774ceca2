//! Archive step backed by a 7-Zip compatible command line.

use async_trait::async_trait;
use harvest_core::services::{ArchiveProgress, ArchiveRequest, Archiver, ServiceError};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Runs `<program> a -y -bsp1 [-p<password>] <output> <folder>/*`.
#[derive(Debug, Clone)]
pub struct SevenZipArchiver {
    program: String,
}

impl SevenZipArchiver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, request: &ArchiveRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("a").arg("-y").arg("-bsp1");
        if let Some(password) = request.password.as_deref().filter(|p| !p.is_empty()) {
            cmd.arg(format!("-p{}", password));
        }
        cmd.arg(&request.output).arg(request.folder.join("*"));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Archiver for SevenZipArchiver {
    async fn archive(
        &self,
        request: &ArchiveRequest,
        progress: ArchiveProgress,
    ) -> Result<(), ServiceError> {
        if let Some(parent) = request.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        // 7z adds to an existing archive; start from scratch so the result mirrors the folder.
        match tokio::fs::remove_file(&request.output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut child = self.command(request).spawn().map_err(|e| {
            ServiceError::Transport(format!("could not run {}: {}", self.program, e))
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (_, errors, status) = tokio::join!(
            forward_progress(stdout, &progress),
            read_all(stderr),
            child.wait()
        );
        let status = status?;
        if !status.success() {
            return Err(ServiceError::Remote(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                errors.trim()
            )));
        }
        let _ = progress.send(100);
        tracing::debug!(output = %request.output.display(), "archive written");
        Ok(())
    }
}

/// Reads 7z's `-bsp1` progress stream and sends each new percentage.
async fn forward_progress<R: AsyncRead + Unpin>(stream: Option<R>, progress: &ArchiveProgress) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buf = [0u8; 1024];
    let mut last = None;
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for pct in parse_percentages(&String::from_utf8_lossy(&buf[..n])) {
                    if last.map_or(true, |l| pct > l) {
                        last = Some(pct);
                        let _ = progress.send(pct);
                    }
                }
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut out = String::new();
    if let Some(mut stream) = stream {
        let _ = stream.read_to_string(&mut out).await;
    }
    out
}

/// Every `NN%` token in a chunk of 7z output.
fn parse_percentages(chunk: &str) -> Vec<u8> {
    let bytes = chunk.as_bytes();
    let mut out = Vec::new();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'%' {
            continue;
        }
        let start = bytes[..i]
            .iter()
            .rposition(|c| !c.is_ascii_digit())
            .map_or(0, |p| p + 1);
        if start < i {
            if let Ok(pct) = chunk[start..i].parse::<u16>() {
                if pct <= 100 {
                    out.push(pct as u8);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_progress_tokens() {
        assert_eq!(parse_percentages("  0%\u{8}\u{8}\u{8}\u{8}  12% 3 + a.jpg"), vec![0, 12]);
        assert_eq!(parse_percentages("100%"), vec![100]);
        assert!(parse_percentages("Everything is Ok").is_empty());
        assert!(parse_percentages("% 250%").is_empty());
    }

    #[test]
    fn command_line_includes_password_and_wildcard() {
        let archiver = SevenZipArchiver::new("7z");
        let request = ArchiveRequest {
            folder: PathBuf::from("/dl/job"),
            output: PathBuf::from("/dl/job.zip"),
            password: Some("pw".to_string()),
        };
        let cmd = archiver.command(&request);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["a", "-y", "-bsp1", "-ppw", "/dl/job.zip", "/dl/job/*"]);
    }

    #[tokio::test]
    async fn missing_program_is_a_transport_error() {
        let archiver = SevenZipArchiver::new("/nonexistent/harvest-7z");
        let dir = tempfile::tempdir().unwrap();
        let request = ArchiveRequest {
            folder: dir.path().to_path_buf(),
            output: dir.path().join("out.zip"),
            password: None,
        };
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = archiver.archive(&request, tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }
}
