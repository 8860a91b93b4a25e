//! Malware scan contract and the built-in signature scanner.
//!
//! The pipeline only consumes the verdict (clean / infected / error); engine
//! internals stay behind the `MalwareScanner` trait. Any fault path yields an
//! error result, never a silent "clean".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ScanVerdict;

/// Known executable header signatures. A financial-aid document (PDF, image,
/// scan) must never start with one of these.
const EXECUTABLE_SIGNATURES: &[(&[u8], &str)] = &[
    (b"MZ", "dos-executable-header"),
    (&[0x7f, b'E', b'L', b'F'], "elf-executable-header"),
    (&[0xca, 0xfe, 0xba, 0xbe], "java-class-header"),
    (&[0xfe, 0xed, 0xfa, 0xce], "macho-32-header"),
    (&[0xfe, 0xed, 0xfa, 0xcf], "macho-64-header"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub is_clean: bool,
    pub threats: Vec<String>,
    pub scanned_at: DateTime<Utc>,
    pub scanner_version: String,
    pub error: Option<String>,
}

impl ScanResult {
    pub fn clean(version: &str) -> Self {
        Self {
            is_clean: true,
            threats: Vec::new(),
            scanned_at: Utc::now(),
            scanner_version: version.to_string(),
            error: None,
        }
    }

    pub fn infected(threats: Vec<String>, version: &str) -> Self {
        Self {
            is_clean: false,
            threats,
            scanned_at: Utc::now(),
            scanner_version: version.to_string(),
            error: None,
        }
    }

    pub fn error(message: &str, version: &str) -> Self {
        Self {
            is_clean: false,
            threats: Vec::new(),
            scanned_at: Utc::now(),
            scanner_version: version.to_string(),
            error: Some(message.to_string()),
        }
    }

    pub fn verdict(&self) -> ScanVerdict {
        if self.error.is_some() {
            ScanVerdict::Error
        } else if self.is_clean {
            ScanVerdict::Clean
        } else {
            ScanVerdict::Infected
        }
    }
}

pub trait MalwareScanner: Send + Sync {
    fn scan(&self, bytes: &[u8], file_name: &str) -> ScanResult;

    /// Idempotent availability probe for upstream circuit-breaking.
    fn is_available(&self) -> bool;
}

/// Byte-signature scanner: flags streams that start with a known executable
/// header. Empty streams are an error, not clean.
pub struct SignatureScanner {
    version: String,
}

impl SignatureScanner {
    pub fn new() -> Self {
        Self {
            version: format!("signature-scanner/{}", crate::config::APP_VERSION),
        }
    }
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MalwareScanner for SignatureScanner {
    fn scan(&self, bytes: &[u8], file_name: &str) -> ScanResult {
        if bytes.is_empty() {
            tracing::warn!(file_name, "Rejecting empty stream at scan stage");
            return ScanResult::error("empty stream", &self.version);
        }

        let threats: Vec<String> = EXECUTABLE_SIGNATURES
            .iter()
            .filter(|(sig, _)| bytes.starts_with(sig))
            .map(|(_, name)| name.to_string())
            .collect();

        if threats.is_empty() {
            ScanResult::clean(&self.version)
        } else {
            tracing::warn!(file_name, ?threats, "Executable signature in upload");
            ScanResult::infected(threats, &self.version)
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}
