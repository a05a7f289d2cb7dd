//! Stable device identification for session records.
//!
//! A device id survives routine browser updates: version numbers are stripped
//! from the user agent before hashing, and only the client's subnet (not its
//! exact address) contributes.

use std::net::IpAddr;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Ios,
    Android,
    Linux,
    Unknown,
}

impl Platform {
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        // iOS user agents also say "like Mac OS X", Android ones also say "Linux".
        if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
            Self::Ios
        } else if ua.contains("android") {
            Self::Android
        } else if ua.contains("windows") {
            Self::Windows
        } else if ua.contains("mac os") || ua.contains("macintosh") {
            Self::MacOs
        } else if ua.contains("linux") || ua.contains("x11") {
            Self::Linux
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Ios => "iOS",
            Self::Android => "Android",
            Self::Linux => "Linux",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Edge,
    Opera,
    Firefox,
    Chrome,
    Safari,
    Unknown,
}

impl Browser {
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        // Chromium derivatives advertise "chrome" and "safari" too; check them first.
        if ua.contains("edg/") || ua.contains("edge/") {
            Self::Edge
        } else if ua.contains("opr/") || ua.contains("opera") {
            Self::Opera
        } else if ua.contains("firefox/") || ua.contains("fxios/") {
            Self::Firefox
        } else if ua.contains("chrome/") || ua.contains("crios/") {
            Self::Chrome
        } else if ua.contains("safari/") {
            Self::Safari
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edge => "Edge",
            Self::Opera => "Opera",
            Self::Firefox => "Firefox",
            Self::Chrome => "Chrome",
            Self::Safari => "Safari",
            Self::Unknown => "Unknown",
        }
    }
}

/// Lowercase and drop version numbers (digits, `.` and `_`).
pub fn normalize_user_agent(user_agent: &str) -> String {
    user_agent
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_digit() && *c != '.' && *c != '_')
        .collect()
}

/// IPv4 /24 or IPv6 /64. Anything unparsable is used verbatim.
pub fn subnet(ip_address: &str) -> String {
    match ip_address.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}:{:x}::/64", s[0], s[1], s[2], s[3])
        }
        Err(_) => ip_address.trim().to_owned(),
    }
}

/// Client-supplied fingerprint if present, otherwise a SHA-256 over the
/// normalized user agent, platform, browser family and subnet.
pub fn derive_device_id(fingerprint: Option<&str>, user_agent: &str, ip_address: &str) -> String {
    if let Some(fp) = fingerprint.map(str::trim).filter(|fp| !fp.is_empty()) {
        return fp.to_owned();
    }
    let material = format!(
        "{}|{}|{}|{}",
        normalize_user_agent(user_agent),
        Platform::detect(user_agent).as_str(),
        Browser::detect(user_agent).as_str(),
        subnet(ip_address),
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

/// `"{browser} on {platform}"`, used when the client names no device.
pub fn default_device_name(user_agent: &str) -> String {
    format!(
        "{} on {}",
        Browser::detect(user_agent).as_str(),
        Platform::detect(user_agent).as_str()
    )
}
