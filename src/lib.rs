pub mod color;
pub mod error;
mod io;
pub mod math;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::RenderError;
pub use renderer::{Assets, Renderer};
pub use scene::SceneSnapshot;
pub use settings::RenderSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
