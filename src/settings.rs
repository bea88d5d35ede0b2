use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub default_framebuffer: u32,
    /// Prefix applied to relative shader stage paths.
    #[serde(default)]
    pub shader_root: Option<PathBuf>,
    #[serde(default = "ContextSettings::default_expand_includes")]
    pub expand_includes: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            default_framebuffer: 0,
            shader_root: None,
            expand_includes: Self::default_expand_includes(),
        }
    }
}

impl ContextSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    /// Reads settings from a JSON file. A missing or malformed file yields
    /// the defaults. A relative `shader_root` is taken relative to the file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No rendering context settings at {:?}; using a {}x{} surface and no shader root.",
                    path,
                    Resolution::default().width,
                    Resolution::default().height
                );
                return ContextSettings::default();
            }
            Err(err) => {
                warn!("Could not read rendering context settings {:?}: {}", path, err);
                return ContextSettings::default();
            }
        };

        match serde_json::from_str::<ContextSettings>(&contents) {
            Ok(settings) => {
                let settings = settings.relative_to(path.parent()).validate();
                info!(
                    "Rendering context: {}x{}, default framebuffer {}, shader root {:?} (from {:?})",
                    settings.resolution.width,
                    settings.resolution.height,
                    settings.default_framebuffer,
                    settings.shader_root,
                    path
                );
                settings
            }
            Err(err) => {
                warn!(
                    "Rendering context settings {:?} are malformed at line {}, column {} ({}). Using defaults.",
                    path,
                    err.line(),
                    err.column(),
                    err
                );
                ContextSettings::default()
            }
        }
    }

    fn relative_to(mut self, base: Option<&Path>) -> Self {
        if let (Some(root), Some(base)) = (&self.shader_root, base) {
            if root.is_relative() && !base.as_os_str().is_empty() {
                self.shader_root = Some(base.join(root));
            }
        }
        self
    }

    fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!(
                "Surface resolution {}x{} has a zero side. Using {}x{}.",
                self.resolution.width,
                self.resolution.height,
                Resolution::default().width,
                Resolution::default().height
            );
            self.resolution = Resolution::default();
        }

        if let Some(root) = &self.shader_root {
            if !root.is_dir() {
                warn!(
                    "Shader root {:?} is not a directory. Stage paths will be used as given.",
                    root
                );
                self.shader_root = None;
            }
        }

        self
    }

    /// Resolves a shader path against `shader_root` unless it is absolute.
    pub fn shader_path(&self, path: &Path) -> PathBuf {
        match &self.shader_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    const fn default_expand_includes() -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: ContextSettings = serde_json::from_str(r#"{ "default_framebuffer": 3 }"#).unwrap();
        assert_eq!(settings.default_framebuffer, 3);
        assert_eq!(settings.resolution, Resolution::default());
        assert!(settings.expand_includes);
        assert!(settings.shader_root.is_none());
    }

    #[test]
    fn zero_resolution_is_replaced() {
        let settings: ContextSettings =
            serde_json::from_str(r#"{ "resolution": { "width": 0, "height": 720 } }"#).unwrap();
        assert_eq!(settings.validate().resolution, Resolution::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = ContextSettings::load_from_path("definitely/not/here.json");
        assert_eq!(settings.resolution.width, 32);
    }

    #[test]
    fn shader_root_must_be_a_directory() {
        let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let file_root = ContextSettings {
            shader_root: Some(manifest.join("Cargo.toml")),
            ..ContextSettings::default()
        };
        assert!(file_root.validate().shader_root.is_none());

        let missing_root = ContextSettings {
            shader_root: Some(manifest.join("no/such/shaders")),
            ..ContextSettings::default()
        };
        assert!(missing_root.validate().shader_root.is_none());

        let shaders = manifest.join("assets/shaders");
        let dir_root = ContextSettings {
            shader_root: Some(shaders.clone()),
            ..ContextSettings::default()
        };
        assert_eq!(dir_root.validate().shader_root, Some(shaders));
    }

    #[test]
    fn relative_shader_root_resolves_against_the_settings_file() {
        let dir = std::env::temp_dir().join(format!("render-queue-settings-{}", std::process::id()));
        fs::create_dir_all(dir.join("shaders")).unwrap();
        let file = dir.join("settings.json");
        fs::write(&file, r#"{ "shader_root": "shaders", "default_framebuffer": 2 }"#).unwrap();

        let settings = ContextSettings::load_from_path(&file);
        assert_eq!(settings.shader_root, Some(dir.join("shaders")));
        assert_eq!(settings.default_framebuffer, 2);

        fs::write(&file, r#"{ "shader_root": "elsewhere" }"#).unwrap();
        assert!(ContextSettings::load_from_path(&file).shader_root.is_none());

        fs::write(&file, "{ not json").unwrap();
        assert_eq!(ContextSettings::load_from_path(&file).default_framebuffer, 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn shader_root_prefixes_relative_paths() {
        let settings = ContextSettings {
            shader_root: Some(PathBuf::from("assets/shaders")),
            ..ContextSettings::default()
        };
        assert_eq!(
            settings.shader_path(Path::new("quad.vert.glsl")),
            PathBuf::from("assets/shaders/quad.vert.glsl")
        );
    }
}
