use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Tab operation failed: {0}")]
    TabFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Interaction failed: {0}")]
    InteractionFailed(String),

    #[error("JavaScript execution failed: {0}")]
    ScriptFailed(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Test data error: {0}")]
    TestData(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    BrowserError(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;

// Convert anyhow::Error (headless_chrome's error type) to FlowError
impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::BrowserError(err.to_string())
    }
}
