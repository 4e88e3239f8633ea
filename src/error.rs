use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Could not start camera: {0}")]
    Camera(String),

    #[error("Landmark model error: {0}")]
    Landmarker(String),

    #[error("Fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("Session already closed")]
    SessionClosed,

    #[error("Landmark frame has {got} points, need at least {need}")]
    MissingLandmarks { got: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
