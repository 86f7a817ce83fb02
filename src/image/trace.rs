//! Attribution of packages to the image layer that introduced them.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::ChainLayer;
use crate::context::ScanContext;
use crate::extractor::{FilesystemExtractor, ScanInput};
use crate::fs::clean_path;
use crate::model::{Inventory, LayerDetails, Package};

/// Identity of a package as re-extracted from a chain layer.
type PackageKey = (String, String, String);

fn key_of(pkg: &Package) -> PackageKey {
    (pkg.name.clone(), pkg.version.clone(), pkg.purl_type.clone())
}

struct Tracer<'a> {
    ctx: &'a ScanContext,
    chain_layers: &'a [ChainLayer],
    extractors: &'a [Arc<dyn FilesystemExtractor>],
    /// Re-extraction results by (layer index, extractor, location); `None`
    /// when extraction failed.
    extracted: HashMap<(usize, String, String), Option<Vec<PackageKey>>>,
}

impl Tracer<'_> {
    async fn extract(&mut self, layer: usize, extractor: &Arc<dyn FilesystemExtractor>, path: &str) -> Option<&[PackageKey]> {
        let cache_key = (layer, extractor.name().to_string(), path.to_string());
        if !self.extracted.contains_key(&cache_key) {
            let chain_layers = self.chain_layers;
            let fs = chain_layers[layer].fs.as_ref();
            let result = match fs.metadata(path) {
                Ok(meta) if meta.is_file() => {
                    let input = ScanInput {
                        fs,
                        path,
                        root: None,
                        size: meta.size,
                    };
                    extractor
                        .extract(self.ctx, &input)
                        .await
                        .ok()
                        .map(|inv| inv.packages.iter().map(key_of).collect())
                }
                _ => None,
            };
            self.extracted.insert(cache_key.clone(), result);
        }
        self.extracted.get(&cache_key).and_then(|r| r.as_deref())
    }

    /// True if every location of `pkg` exists in chain layer `layer` and
    /// still yields `pkg` when re-extracted.
    async fn present_in(&mut self, layer: usize, pkg: &Package, extractors: &[Arc<dyn FilesystemExtractor>]) -> bool {
        let key = key_of(pkg);
        for location in &pkg.locations {
            let path = clean_path(location);
            if !self.chain_layers[layer].fs.exists(&path) {
                return false;
            }
            for extractor in extractors {
                match self.extract(layer, extractor, &path).await {
                    Some(found) if found.contains(&key) => {}
                    _ => return false,
                }
            }
        }
        true
    }

    async fn origin_layer(&mut self, pkg: &Package) -> Option<usize> {
        let extractors: Vec<Arc<dyn FilesystemExtractor>> = self
            .extractors
            .iter()
            .filter(|e| pkg.plugins.iter().any(|p| p == e.name()))
            .cloned()
            .collect();

        // Walk down from the top while the package stays visible; the last
        // layer reached is where it appeared.
        let mut origin = None;
        for layer in (0..self.chain_layers.len()).rev() {
            if !self.present_in(layer, pkg, &extractors).await {
                break;
            }
            origin = Some(layer);
        }
        origin
    }
}

/// Sets [`LayerDetails`] on every package with file locations.
///
/// A package is attributed to the earliest chain layer from which on all of
/// its locations exist and re-extracting them with the filesystem extractor
/// that found the package still yields it. Packages not found in the final
/// layer this way, or without locations, are left unattributed.
pub async fn populate_layer_details(
    ctx: &ScanContext,
    inventory: &mut Inventory,
    chain_layers: &[ChainLayer],
    extractors: &[Arc<dyn FilesystemExtractor>],
) {
    let mut tracer = Tracer {
        ctx,
        chain_layers,
        extractors,
        extracted: HashMap::new(),
    };

    for pkg in &mut inventory.packages {
        if ctx.is_cancelled() {
            return;
        }
        if pkg.locations.is_empty() {
            continue;
        }
        if let Some(index) = tracer.origin_layer(pkg).await {
            let layer = &chain_layers[index];
            debug!(package = %pkg.name, layer = index, diff_id = %layer.diff_id, "attributed package to layer");
            pkg.layer_details = Some(LayerDetails {
                index: layer.index,
                diff_id: layer.diff_id.clone(),
                command: layer.command.clone(),
                in_base_image: layer.in_base_image,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::RequirementsExtractor;
    use crate::fs::{FileSystem, MemFs};
    use crate::image::{Image, Layer, LayeredImage};

    fn layer(i: usize, fs: MemFs) -> Layer {
        Layer::new(format!("sha256:{}", i), Arc::new(fs) as Arc<dyn FileSystem>)
    }

    fn requirements_package(version: &str) -> Package {
        let mut pkg = Package::new("flask", version, "pypi").with_location("app/requirements.txt");
        pkg.add_plugin(RequirementsExtractor::NAME);
        pkg
    }

    fn extractors() -> Vec<Arc<dyn FilesystemExtractor>> {
        vec![Arc::new(RequirementsExtractor)]
    }

    #[tokio::test]
    async fn test_package_attributed_to_introducing_layer() {
        let image = LayeredImage::new(vec![
            layer(0, MemFs::new().with_file("etc/os-release", "ID=debian")),
            layer(1, MemFs::new().with_dir("app")),
            layer(2, MemFs::new().with_file("app/requirements.txt", "flask==3.0.0\n")),
            layer(3, MemFs::new().with_file("app/main.py", "")),
            layer(4, MemFs::new().with_file("tmp/x", "")),
        ])
        .with_base_layers(1);
        let chain = image.chain_layers().unwrap();

        let mut inv = Inventory {
            packages: vec![requirements_package("3.0.0")],
            ..Default::default()
        };
        populate_layer_details(&ScanContext::new(), &mut inv, &chain, &extractors()).await;

        let details = inv.packages[0].layer_details.as_ref().unwrap();
        assert_eq!(details.index, 2);
        assert_eq!(details.diff_id, "sha256:2");
        assert!(!details.in_base_image);
    }

    #[tokio::test]
    async fn test_rewritten_file_attributed_to_rewriting_layer() {
        let image = LayeredImage::new(vec![
            layer(0, MemFs::new().with_file("app/requirements.txt", "flask==2.0.0\n")),
            layer(1, MemFs::new().with_file("app/requirements.txt", "flask==3.0.0\n")),
            layer(2, MemFs::new().with_file("app/main.py", "")),
        ]);
        let chain = image.chain_layers().unwrap();

        let mut inv = Inventory {
            packages: vec![requirements_package("3.0.0")],
            ..Default::default()
        };
        populate_layer_details(&ScanContext::new(), &mut inv, &chain, &extractors()).await;

        assert_eq!(inv.packages[0].layer_details.as_ref().unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_packages_without_locations_unattributed() {
        let image = LayeredImage::new(vec![layer(0, MemFs::new().with_file("a", ""))]);
        let chain = image.chain_layers().unwrap();
        let mut inv = Inventory {
            packages: vec![Package::new("npm", "10.0.0", "npm")],
            ..Default::default()
        };
        populate_layer_details(&ScanContext::new(), &mut inv, &chain, &extractors()).await;
        assert!(inv.packages[0].layer_details.is_none());
    }
}
