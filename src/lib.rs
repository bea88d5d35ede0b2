pub mod asset;
pub mod io;
pub mod renderer;
pub mod settings;

pub use renderer::{HeadlessBackend, RenderError, RenderPass, RenderingContext};
pub use settings::ContextSettings;

/// Installs the `env_logger` backend at `Info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
