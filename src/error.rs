use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::bencode;

/// Every error an announce can produce. Per the error-handling design, none
/// of these ever become an HTTP error status: each renders to a bencoded
/// `failure reason` dict at `200 OK`, because re-announcing clients have no
/// other way to learn policy short of a parseable response.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("temporarily unavailable")]
    TrackerUnavailable,
    #[error("Passkey not found")]
    PasskeyNotFound,
    #[error("Invalid peer ID")]
    InvalidPeerId,
    #[error("Unregistered client for this tracker")]
    NotWhitelisted,
    #[error("Invalid compact value")]
    InvalidCompact,
    #[error("Torrent not found")]
    TorrentNotFound,
    #[error("Access denied, leeching forbidden")]
    LeechingForbidden,
    #[error("Invalid info_hash")]
    InvalidInfoHash,
    #[error("Invalid request")]
    MalformedRequest,
}

impl IntoResponse for AnnounceError {
    fn into_response(self) -> Response {
        (StatusCode::OK, bencode::failure_reason(&self.to_string())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_renders_as_200() {
        let response = AnnounceError::PasskeyNotFound.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
