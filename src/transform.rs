//! Optional subprocess hash transform (spec §5, §9.6): a single persistent
//! child process that receives each record on stdin and returns exactly
//! one delimiter-framed record on stdout, bracketed by a timeout so a
//! misbehaving transform can never block the (single-threaded) engine
//! indefinitely.

use std::cell::RefCell;
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use crate::error::{CliError, CliResult};
use crate::fingerprint::HashTransform;
use crate::io::delimiter::Delimiter;
use crate::io::record::RecordReader;

pub struct SubprocessTransform {
    child: Child,
    stdin: RefCell<ChildStdin>,
    rx: Receiver<CliResult<Vec<u8>>>,
    timeout: Duration,
    delimiter: Delimiter,
}

impl SubprocessTransform {
    pub fn spawn(command: &str, delimiter: Delimiter, timeout: Duration) -> CliResult<Self> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CliError::Transform(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CliError::Transform("child process has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::Transform("child process has no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let reader_delimiter = delimiter.clone();
        thread::spawn(move || {
            let mut reader = RecordReader::new(stdout, reader_delimiter, false);
            loop {
                let outcome = reader.next_record();
                let done = matches!(outcome, Ok(None) | Err(_));
                let sent = match outcome {
                    Ok(Some(record)) => tx.send(Ok(record)).is_ok(),
                    Ok(None) => true,
                    Err(e) => tx.send(Err(e)).is_ok(),
                };
                if done || !sent {
                    break;
                }
            }
        });

        Ok(SubprocessTransform {
            child,
            stdin: RefCell::new(stdin),
            rx,
            timeout,
            delimiter,
        })
    }
}

impl Drop for SubprocessTransform {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl HashTransform for SubprocessTransform {
    fn apply(&self, record: &[u8]) -> CliResult<Vec<u8>> {
        if record.windows(self.delimiter.bytes().len()).any(|w| w == self.delimiter.bytes()) {
            return Err(CliError::Transform(
                "record contains an embedded delimiter; cannot frame it for the hash transform".to_string(),
            ));
        }
        {
            let mut stdin = self.stdin.borrow_mut();
            stdin
                .write_all(record)
                .and_then(|_| stdin.write_all(self.delimiter.bytes()))
                .and_then(|_| stdin.flush())
                .map_err(|e| CliError::Transform(format!("writing to hash transform stdin: {e}")))?;
        }
        match self.rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CliError::Transform(format!(
                "hash transform did not respond within {:?}",
                self.timeout
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CliError::Transform(
                "hash transform process exited before responding".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_record_through_cat() {
        let t = SubprocessTransform::spawn("cat", Delimiter::Newline, Duration::from_secs(5)).unwrap();
        let out = t.apply(b"hello").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn times_out_on_a_silent_command() {
        let t = SubprocessTransform::spawn("sleep 5", Delimiter::Newline, Duration::from_millis(50)).unwrap();
        assert!(t.apply(b"hello").is_err());
    }

    #[test]
    fn rejects_embedded_delimiter() {
        let t = SubprocessTransform::spawn("cat", Delimiter::Newline, Duration::from_secs(5)).unwrap();
        assert!(t.apply(b"hello\nworld").is_err());
    }
}
