// renderer/error.rs
use std::fmt;

#[derive(Debug)]
pub enum RenderError {
    Io(std::io::Error),
    ShaderCompile { name: String, message: String },
    ShaderLink(String),
    Image(String),
    UnsupportedImage(String),
}

impl From<std::io::Error> for RenderError {
    fn from(e: std::io::Error) -> Self {
        RenderError::Io(e)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Io(e) => write!(f, "IO error: {}", e),
            RenderError::ShaderCompile { name, message } => {
                write!(f, "Failed to compile shader stage {}: {}", name, message)
            }
            RenderError::ShaderLink(e) => write!(f, "Failed to link shader program: {}", e),
            RenderError::Image(e) => write!(f, "Image error: {}", e),
            RenderError::UnsupportedImage(e) => write!(f, "Unsupported image: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io(e) => Some(e),
            _ => None,
        }
    }
}
