//! Container images as stacks of filesystem layers.
//!
//! An [`Image`] exposes its flattened filesystem and its chain layers: the
//! cumulative filesystem after each layer is applied. The scanner uses the
//! chain layers to find which layer introduced a package.

mod trace;

pub use trace::populate_layer_details;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::ScanError;
use crate::fs::{DirFs, FileSystem, OverlayFs};

/// The cumulative filesystem of an image up to and including one layer.
#[derive(Clone)]
pub struct ChainLayer {
    /// Position of the layer in the image, starting at 0.
    pub index: usize,
    pub diff_id: String,
    /// Build command that created the layer, if known.
    pub command: String,
    pub in_base_image: bool,
    pub fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for ChainLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLayer")
            .field("index", &self.index)
            .field("diff_id", &self.diff_id)
            .field("command", &self.command)
            .field("in_base_image", &self.in_base_image)
            .finish()
    }
}

/// A container image that can be scanned.
pub trait Image: Send + Sync {
    /// The image's final filesystem with every layer applied.
    fn fs(&self) -> Arc<dyn FileSystem>;

    /// Chain layers ordered from the first layer to the last.
    fn chain_layers(&self) -> Result<Vec<ChainLayer>, ScanError>;
}

/// One layer of a [`LayeredImage`].
#[derive(Debug, Clone)]
pub struct Layer {
    pub diff_id: String,
    pub command: String,
    pub in_base_image: bool,
    /// The files this layer adds, with `.wh.` whiteouts for removals.
    pub fs: Arc<dyn FileSystem>,
}

impl Layer {
    pub fn new(diff_id: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            diff_id: diff_id.into(),
            command: String::new(),
            in_base_image: false,
            fs,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn in_base_image(mut self, in_base_image: bool) -> Self {
        self.in_base_image = in_base_image;
        self
    }
}

/// An image assembled from an ordered list of layer filesystems.
#[derive(Debug, Clone, Default)]
pub struct LayeredImage {
    layers: Vec<Layer>,
}

impl LayeredImage {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// An image whose layers are unpacked into local directories, bottom first.
    ///
    /// Each layer's diff ID is its directory name.
    pub fn from_dirs<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let layers = dirs
            .iter()
            .map(|dir| {
                let dir = dir.as_ref();
                let diff_id = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string());
                Layer::new(diff_id, Arc::new(DirFs::new(dir)))
            })
            .collect();
        Self { layers }
    }

    /// Marks the first `count` layers as belonging to the base image.
    pub fn with_base_layers(mut self, count: usize) -> Self {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.in_base_image = i < count;
        }
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn overlay(&self, upto: usize) -> Arc<dyn FileSystem> {
        Arc::new(OverlayFs::new(self.layers[..upto].iter().map(|l| l.fs.clone()).collect()))
    }
}

impl Image for LayeredImage {
    fn fs(&self) -> Arc<dyn FileSystem> {
        self.overlay(self.layers.len())
    }

    fn chain_layers(&self) -> Result<Vec<ChainLayer>, ScanError> {
        if self.layers.is_empty() {
            return Err(ScanError::ChainLayers("image has no layers".to_string()));
        }
        Ok(self
            .layers
            .iter()
            .enumerate()
            .map(|(index, layer)| ChainLayer {
                index,
                diff_id: layer.diff_id.clone(),
                command: layer.command.clone(),
                in_base_image: layer.in_base_image,
                fs: self.overlay(index + 1),
            })
            .collect())
    }
}
