use crate::errors::{PrinterError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// The operating system's printing facilities, as seen by the execution
/// engine. Every call is opaque: it either hands the document off or fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrintBackend: Send + Sync {
    /// Print with the file's associated application.
    async fn shell_print(&self, path: &Path) -> Result<()>;

    /// Write a copy of `input` to `output` with form fields flattened.
    async fn flatten_pdf(&self, input: &Path, output: &Path) -> Result<()>;

    /// Print a document through `printer`, or the default printer.
    async fn print_document(&self, path: &Path, printer: Option<String>) -> Result<()>;
}

/// Shells out to the platform print tooling (`lp` / PowerShell) and `qpdf`.
#[derive(Debug, Clone, Default)]
pub struct SystemPrintBackend;

impl SystemPrintBackend {
    pub fn new() -> Self {
        Self
    }

    async fn run(program: &str, args: &[&str], ok_codes: &[i32]) -> Result<()> {
        debug!("Running {} {:?}", program, args);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PrinterError::Print(format!("Failed to start {}: {}", program, e)))?;

        match output.status.code() {
            Some(code) if ok_codes.contains(&code) => Ok(()),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(PrinterError::Print(if stderr.is_empty() {
                    format!("{} exited with {:?}", program, code)
                } else {
                    format!("{}: {}", program, stderr)
                }))
            }
        }
    }

    /// PowerShell string literal.
    #[cfg(windows)]
    fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[async_trait]
impl PrintBackend for SystemPrintBackend {
    #[cfg(windows)]
    async fn shell_print(&self, path: &Path) -> Result<()> {
        let script = format!(
            "Start-Process -FilePath {} -Verb Print -WindowStyle Hidden",
            Self::quote(&path.to_string_lossy())
        );
        Self::run("powershell", &["-NoProfile", "-Command", &script], &[0]).await
    }

    #[cfg(not(windows))]
    async fn shell_print(&self, path: &Path) -> Result<()> {
        Self::run("lp", &[&path.to_string_lossy()], &[0]).await
    }

    async fn flatten_pdf(&self, input: &Path, output: &Path) -> Result<()> {
        // qpdf exits with 3 when it succeeded with warnings
        Self::run(
            "qpdf",
            &[
                "--flatten-annotations=all",
                "--generate-appearances",
                &input.to_string_lossy(),
                &output.to_string_lossy(),
            ],
            &[0, 3],
        )
        .await
    }

    #[cfg(windows)]
    async fn print_document(&self, path: &Path, printer: Option<String>) -> Result<()> {
        let file = Self::quote(&path.to_string_lossy());
        let script = match printer {
            Some(printer) => format!(
                "Start-Process -FilePath {} -Verb PrintTo -ArgumentList {} -WindowStyle Hidden",
                file,
                Self::quote(&printer)
            ),
            None => format!("Start-Process -FilePath {} -Verb Print -WindowStyle Hidden", file),
        };
        Self::run("powershell", &["-NoProfile", "-Command", &script], &[0]).await
    }

    #[cfg(not(windows))]
    async fn print_document(&self, path: &Path, printer: Option<String>) -> Result<()> {
        let path = path.to_string_lossy();
        match printer {
            Some(printer) => Self::run("lp", &["-d", &printer, &path], &[0]).await,
            None => Self::run("lp", &[&path], &[0]).await,
        }
    }
}
