//! Google OAuth endpoints and the scopes sleepsync asks for.

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Read access to sessions and sleep segments.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/fitness.activity.read",
    "https://www.googleapis.com/auth/fitness.sleep.read",
];
