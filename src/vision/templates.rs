//! Template Store
//!
//! Loads the reference card images once and keeps them for the life of the
//! process. Each template is named after its file with the extension removed.

use image::RgbImage;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::error::VisionError;
use super::preprocess;
use crate::storage;

/// Reference image for one card
#[derive(Debug, Clone)]
pub struct Template {
    /// Unique card name, e.g. "Hearts Ace"
    pub name: String,
    image: RgbImage,
}

impl Template {
    pub fn new(name: impl Into<String>, image: RgbImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Decode a template from disk, resized by `scale`
    pub fn from_file(path: &Path, scale: f32) -> Result<Self, VisionError> {
        let img = image::open(path).map_err(|source| VisionError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let rgb = img.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(VisionError::EmptyImage(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (orig_w, orig_h) = rgb.dimensions();
        let template = Self::new(name, preprocess::downscale(&rgb, scale));
        debug!(
            "Loaded template '{}' ({}x{} -> {}x{})",
            template.name,
            orig_w,
            orig_h,
            template.width(),
            template.height()
        );

        Ok(template)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Fixed library of card templates in load order
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: Vec<Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every image in `directory`.
    ///
    /// A missing directory or unreadable files are logged and leave the store
    /// empty or reduced; loading never fails.
    pub fn load(directory: &Path, extensions: &[String], scale: f32) -> Self {
        match Self::try_load(directory, extensions, scale) {
            Ok(store) => {
                info!("Loaded {} card templates from {:?}", store.len(), directory);
                store
            }
            Err(e) => {
                error!("{}", e);
                Self::new()
            }
        }
    }

    fn try_load(directory: &Path, extensions: &[String], scale: f32) -> Result<Self, VisionError> {
        if !directory.is_dir() {
            return Err(VisionError::TemplateDirMissing(directory.to_path_buf()));
        }

        let files = storage::list_images(directory, extensions).map_err(|source| {
            VisionError::ReadDir {
                path: directory.to_path_buf(),
                source,
            }
        })?;

        let mut store = Self::new();
        for path in files {
            let result = Template::from_file(&path, scale)
                .and_then(|template| store.insert(template))
                .map_err(|e| match e {
                    VisionError::DuplicateTemplate { name, .. } => {
                        VisionError::DuplicateTemplate { name, path: path.clone() }
                    }
                    other => other,
                });

            if let Err(e) = result {
                warn!("Skipping template: {}", e);
            }
        }

        Ok(store)
    }

    /// Add a template, rejecting a name that is already present
    pub fn insert(&mut self, template: Template) -> Result<(), VisionError> {
        if self.contains(&template.name) {
            return Err(VisionError::DuplicateTemplate {
                name: template.name,
                path: Default::default(),
            });
        }
        self.templates.push(template);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.iter().any(|t| t.name == name)
    }

    /// Templates in load order
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
