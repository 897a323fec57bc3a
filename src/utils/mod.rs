//! Utility functions and helpers for message-export
//!
//! This module provides small helpers used throughout the application:
//! - Number formatting for progress and summaries
//! - Time and duration formatting
//! - File system helpers for artifact names

use std::time::Duration;

/// Number formatting utilities
pub mod number {
    /// Format a number with thousands separators
    ///
    /// # Arguments
    /// * `n` - Number to format
    ///
    /// # Returns
    /// * `String` - Formatted number (e.g., "1,234,567")
    pub fn group_thousands(n: u64) -> String {
        let digits = n.to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);

        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }

        out
    }

    /// Format bytes as human-readable size
    ///
    /// # Arguments
    /// * `bytes` - Number of bytes
    ///
    /// # Returns
    /// * `String` - Formatted size (e.g., "1.50 MB")
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

/// Time and duration utilities
pub mod time {
    use super::*;

    /// Format an uptime as days, hours and minutes
    ///
    /// # Arguments
    /// * `duration` - Time since start
    ///
    /// # Returns
    /// * `String` - Formatted uptime (e.g., "2d 3h 14m")
    pub fn format_uptime(duration: Duration) -> String {
        let secs = duration.as_secs();
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        let minutes = (secs % 3600) / 60;
        format!("{days}d {hours}h {minutes}m")
    }

    /// Format duration as human-readable string
    ///
    /// # Arguments
    /// * `duration` - Duration to format
    ///
    /// # Returns
    /// * `String` - Formatted duration (e.g., "1h 30m 45s")
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();

        if secs == 0 {
            return format!("{}ms", millis);
        }

        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        let mut parts = Vec::new();

        if hours > 0 {
            parts.push(format!("{}h", hours));
        }
        if minutes > 0 {
            parts.push(format!("{}m", minutes));
        }
        if seconds > 0 || parts.is_empty() {
            parts.push(format!("{}s", seconds));
        }

        parts.join(" ")
    }
}

/// File system utilities
pub mod fs {
    /// Make a label safe to embed in a file name
    ///
    /// Path separators, reserved characters and whitespace become `_`.
    /// An empty result falls back to `"export"`.
    pub fn sanitize_filename(label: &str) -> String {
        let cleaned: String = label
            .trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
                c if c.is_whitespace() || c.is_control() => '_',
                c => c,
            })
            .collect();

        let cleaned = cleaned.trim_matches('.');
        if cleaned.is_empty() {
            "export".to_string()
        } else {
            cleaned.to_string()
        }
    }
}
