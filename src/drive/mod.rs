//! Google Drive browsing: OAuth session, REST client and folder navigation.

pub mod client;
pub mod consent;
pub mod entry;
pub mod navigator;
pub mod session;

use thiserror::Error;

pub use client::{DriveClient, FolderLister};
pub use consent::{BrowserConsent, ConsentFlow, TokenGrant};
pub use entry::{format_size, DriveEntry, EntryKind, FOLDER_MIME_TYPE};
pub use navigator::{
    Breadcrumb, ListingOutcome, ListingRequest, ListingStatus, NavigationState, Navigator,
    Selection,
};
pub use session::{AccessToken, Clock, DriveSession, SystemClock};

/// Read-only Drive access.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Drive is not configured: {0}")]
    Configuration(String),

    #[error("Google sign-in is not available: {0}")]
    ServiceUnavailable(String),

    #[error("Drive session used before initialization")]
    NotInitialized,

    #[error("Google sign-in was cancelled")]
    AuthenticationDenied,

    #[error("Google sign-in was abandoned")]
    SignInCancelled,

    #[error("Google sign-in failed: {code}")]
    Authentication { code: String },

    #[error("Failed to list folder (HTTP {status})")]
    DirectoryFetch { status: u16 },

    #[error("Failed to download file (HTTP {status})")]
    Download { status: u16 },

    #[error("'{0}' is not a folder")]
    NotAFolder(String),

    #[error("Breadcrumb {index} out of range (path has {len} entries)")]
    BreadcrumbOutOfRange { index: usize, len: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// Failures the user can fix by signing in again.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            DriveError::AuthenticationDenied
                | DriveError::Authentication { .. }
                | DriveError::DirectoryFetch { status: 401 }
                | DriveError::Download { status: 401 }
        )
    }
}
