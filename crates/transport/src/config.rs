use std::path::PathBuf;

use protocol::{ClientError, FrameStyle};

/// Minimum certificate chain depth accepted when verification is enabled.
pub const MIN_VERIFY_DEPTH: u8 = 5;

/// Stream settings shared by every connection a connector opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Verify the server certificate chain. Disabling accepts any peer.
    pub verify_cert: bool,
    /// PEM bundle of trusted CAs. Falls back to the bundled web PKI roots.
    pub ca_bundle: Option<PathBuf>,
    /// Maximum chain depth to accept. Never below [`MIN_VERIFY_DEPTH`].
    pub verify_depth: u8,
    /// Frame layout of the configured protocol revision.
    pub frame: FrameStyle,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify_cert: true,
            ca_bundle: None,
            verify_depth: MIN_VERIFY_DEPTH,
            frame: FrameStyle::Tagged,
        }
    }
}

impl TransportConfig {
    /// Checks the invariants that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.verify_cert && self.verify_depth < MIN_VERIFY_DEPTH {
            return Err(ClientError::Configuration {
                message: format!(
                    "verify_depth must be at least {MIN_VERIFY_DEPTH}, got {}",
                    self.verify_depth
                ),
            });
        }
        Ok(())
    }
}
