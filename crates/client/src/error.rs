/// Errors surfaced by the client transport and loader.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server could not be reached or the request failed in transit.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected wire shape.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
