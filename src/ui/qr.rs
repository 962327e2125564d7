//! Scan-code rendering.

use base64::{engine::general_purpose::STANDARD, Engine};
use qrcode::render::{svg, unicode};
use qrcode::types::QrError;
use qrcode::QrCode;
use thiserror::Error;

use crate::session::LoginArtifact;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("scan-code payload is empty")]
    Empty,
    #[error("failed to encode QR code: {0}")]
    Encode(#[from] QrError),
}

/// Turns a raw scan-code payload into something a caller can display.
pub trait ArtifactRenderer: Send + Sync + 'static {
    fn render(&self, raw: &str) -> Result<LoginArtifact, RenderError>;
}

/// Renders an SVG QR code wrapped in a `data:` URL.
#[derive(Debug, Clone, Copy)]
pub struct QrDataUrlRenderer {
    min_size: u32,
}

impl QrDataUrlRenderer {
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for QrDataUrlRenderer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ArtifactRenderer for QrDataUrlRenderer {
    fn render(&self, raw: &str) -> Result<LoginArtifact, RenderError> {
        if raw.is_empty() {
            return Err(RenderError::Empty);
        }

        let code = QrCode::new(raw.as_bytes())?;
        let image = code
            .render::<svg::Color>()
            .min_dimensions(self.min_size, self.min_size)
            .quiet_zone(true)
            .build();

        Ok(LoginArtifact::new(format!(
            "data:image/svg+xml;base64,{}",
            STANDARD.encode(image)
        )))
    }
}

/// Compact block-character QR for terminal output.
pub fn render_terminal(raw: &str) -> Option<String> {
    let code = QrCode::new(raw.as_bytes()).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}
