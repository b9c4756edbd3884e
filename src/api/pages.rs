//! Minimal HTML pages rendered by the redirect resolver and the proxy.

use crate::types::JobStatus;
use crate::utils::html_escape;

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: sans-serif; text-align: center; padding-top: 50px;\">\n{body}\n</body>\n</html>\n"
    )
}

/// Unknown or expired job; both look the same to the client
pub fn not_found() -> String {
    page(
        "Download not found",
        "<h1>404 - Download not found</h1>\n\
         <p>This download link is invalid or has expired.</p>",
    )
}

/// Self-refreshing wait page
pub fn waiting(status: JobStatus, progress: u8, refresh_seconds: u32) -> String {
    page(
        "Preparing download",
        &format!(
            "<h1>Your download is being prepared...</h1>\n\
             <p>Status: {status} ({progress}%)</p>\n\
             <p>This page refreshes every {refresh_seconds} seconds. Please wait.</p>"
        ),
    )
}

/// Failed job, with its reason escaped
pub fn failed(error: &str) -> String {
    page(
        "Download failed",
        &format!(
            "<h1>500 - Download failed</h1>\n\
             <p>Sorry, something went wrong while fetching your file.</p>\n\
             <p><small>Error: {}</small></p>",
            html_escape(error)
        ),
    )
}

/// Usage hint for `/proxy` without a target
pub fn proxy_usage() -> String {
    page(
        "Missing url",
        "<h1>The \"url\" query parameter is required.</h1>\n\
         <p>Example: /proxy?url=https://example.com</p>",
    )
}
