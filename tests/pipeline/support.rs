//! Shared fixtures for pipeline tests

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, Rgb, RgbImage};
use tempfile::TempDir;

use wallpaper_fetcher::app::{
    Acquirer, AcquirerConfig, AcquisitionTask, CandidateSource, CollectRequest, FeedSource,
    Ledger, PathLayout, ResolutionTier, RunSummary, Transport, TransportConfig, WorkerConfig,
    WorkerPool, collect_groups, schedule,
};

/// Deterministic JPEG; different seeds give different pictures
pub fn jpeg(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width.max(1)) as u8 ^ seed,
            ((y * 255) / height.max(1)) as u8,
            seed.wrapping_mul(37),
        ])
    });
    let mut cursor = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut cursor, 90)
        .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    cursor.into_inner()
}

pub fn write_feed(dir: &Path, name: &str, document: serde_json::Value) -> PathBuf {
    let path = dir.join(format!("{}.json", name));
    std::fs::write(&path, document.to_string()).unwrap();
    path
}

/// Everything needed to run the pipeline against one output root
pub struct Pipeline {
    pub dir: TempDir,
    pub config: AcquirerConfig,
    pub tiers: Vec<ResolutionTier>,
    feeds: Vec<(String, PathBuf)>,
}

impl Pipeline {
    pub fn new(tiers: &[ResolutionTier]) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            config: AcquirerConfig::default(),
            tiers: tiers.to_vec(),
            feeds: Vec::new(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn layout(&self) -> PathLayout {
        PathLayout::new(self.root())
    }

    pub fn add_feed(&mut self, name: &str, document: serde_json::Value) {
        let path = write_feed(self.dir.path(), name, document);
        self.feeds.push((name.to_string(), path));
    }

    pub async fn tasks(&self) -> Vec<AcquisitionTask> {
        let mut sources: Vec<Arc<dyn CandidateSource>> = Vec::new();
        for (name, path) in &self.feeds {
            let source = FeedSource::from_file(name.clone(), path.clone())
                .detect_chain_tiers()
                .await;
            sources.push(Arc::new(source));
        }
        let request = CollectRequest::new("", self.tiers.clone());
        let groups = collect_groups(&sources, &request).await;
        schedule(groups, &self.config.aliases).0
    }

    pub async fn run(&self) -> (RunSummary, Arc<Ledger>) {
        let tasks = self.tasks().await;
        let layout = self.layout();
        let ledger = Arc::new(Ledger::open(layout.ledger_path()).unwrap());
        let transport = Arc::new(Transport::with_config(TransportConfig::fast()).unwrap());
        let acquirer = Arc::new(Acquirer::new(
            transport,
            ledger.clone(),
            layout,
            self.config.clone(),
        ));
        let summary = WorkerPool::new(WorkerConfig::default().with_worker_count(4), acquirer, tasks)
            .run(|_| {})
            .await
            .unwrap();
        (summary, ledger)
    }

    /// Image files under the output root with their contents
    pub fn image_files(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect_images(&self.root(), &mut files);
        files
    }
}

fn collect_images(dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_images(&path, files);
        } else if path.extension().is_some_and(|ext| ext == "jpg") {
            files.insert(path.clone(), std::fs::read(&path).unwrap());
        }
    }
}
