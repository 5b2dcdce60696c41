//! Client-side preconditions checked before any external call.

use image::ImageFormat;

use crate::error::{ErrorInfo, InputField};

pub const INVALID_EMAIL: &str = "*Enter valid email address";
pub const INVALID_PASSWORD: &str = "*Enter valid password";
pub const INVALID_DAYS: &str = "*Chart range must be at least one day";
pub const EMPTY_PICTURE: &str = "*Choose a picture to upload";
pub const PICTURE_TOO_LARGE: &str = "*Picture must be 5 MiB or smaller";
pub const UNSUPPORTED_PICTURE: &str = "*Picture must be a PNG, JPEG, GIF or WebP image";
pub const EMPTY_COIN_ID: &str = "*Choose a coin";

pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

pub fn validate_email(email: &str) -> Result<(), ErrorInfo> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ErrorInfo::validation(InputField::Email, INVALID_EMAIL));
    };
    let domain_ok = domain
        .split_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty());
    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(ErrorInfo::validation(InputField::Email, INVALID_EMAIL));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ErrorInfo> {
    if password.is_empty() {
        return Err(ErrorInfo::validation(InputField::Password, INVALID_PASSWORD));
    }
    Ok(())
}

/// Email first, then password; the first failure wins.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ErrorInfo> {
    validate_email(email)?;
    validate_password(password)
}

pub fn validate_picture(bytes: &[u8]) -> Result<(), ErrorInfo> {
    if bytes.is_empty() {
        return Err(ErrorInfo::validation(InputField::Image, EMPTY_PICTURE));
    }
    if bytes.len() > MAX_PICTURE_BYTES {
        return Err(ErrorInfo::validation(InputField::Image, PICTURE_TOO_LARGE));
    }
    if supported_mime(bytes).is_none() {
        return Err(ErrorInfo::validation(InputField::Image, UNSUPPORTED_PICTURE));
    }
    Ok(())
}

/// MIME type of a supported picture format, sniffed from its leading bytes.
pub fn supported_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

pub fn validate_days(days: u32) -> Result<(), ErrorInfo> {
    if days == 0 {
        return Err(ErrorInfo::validation(InputField::Days, INVALID_DAYS));
    }
    Ok(())
}

pub fn validate_coin_id(coin_id: &str) -> Result<(), ErrorInfo> {
    if coin_id.trim().is_empty() {
        return Err(ErrorInfo::validation(InputField::CoinId, EMPTY_COIN_ID));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
