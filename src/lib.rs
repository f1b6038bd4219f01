pub mod api;
pub mod compositor;
pub mod config;
pub mod dedup;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod segmenter;
pub mod srt;
pub mod summary;
pub mod timeline;
pub mod upload;
pub mod workspace;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        "ERROR" => tracing::error!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    logv("ERROR", message.as_ref());
}
