use columnar_bridge::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Could not open {path}: {source}")]
    Open { path: String, source: BridgeError },

    #[error("Row group {0} does not exist")]
    NoSuchRowGroup(usize),

    #[error("Could not load reader properties: {0}")]
    Properties(BridgeError),

    #[error("Could not render output: {0}")]
    Render(#[from] serde_json::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
