pub mod qr;

pub use qr::{render_terminal, ArtifactRenderer, QrDataUrlRenderer, RenderError};
