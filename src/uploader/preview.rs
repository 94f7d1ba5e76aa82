//! 预览图管理
//!
//! 预览图是本地生成、需要显式释放的资源。同时存在的预览数量有上限，
//! 与队列长度无关：超出上限的上传项不生成预览。
//! 句柄 drop 时归还名额，所以移除上传项、重置队列都会自动释放。

use image::{DynamicImage, ImageOutputFormat};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 预览名额预算
#[derive(Debug, Clone)]
pub struct PreviewBudget {
    limit: usize,
    live: Arc<AtomicUsize>,
    edge: u32,
}

/// 已占用的一个预览名额，drop 时归还
#[derive(Debug)]
struct PreviewSlot {
    live: Arc<AtomicUsize>,
}

impl Drop for PreviewSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 预览图句柄
pub struct PreviewHandle {
    bytes: Arc<Vec<u8>>,
    _slot: PreviewSlot,
}

impl PreviewHandle {
    /// JPEG 编码的缩略图
    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn mime(&self) -> &'static str {
        "image/jpeg"
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PreviewBudget {
    pub fn new(limit: usize, edge: u32) -> Self {
        Self {
            limit,
            live: Arc::new(AtomicUsize::new(0)),
            edge: edge.max(1),
        }
    }

    /// 当前存活的预览数量
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 尝试占用一个名额
    fn try_reserve(&self) -> Option<PreviewSlot> {
        let reserved = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.limit).then_some(live + 1)
            })
            .is_ok();
        reserved.then(|| PreviewSlot {
            live: Arc::clone(&self.live),
        })
    }

    /// 为本地图片生成缩略图
    ///
    /// 名额已满或图片无法解码（如 HEIC）时返回 None，不影响上传
    pub async fn generate(&self, path: &Path) -> Option<PreviewHandle> {
        let slot = self.try_reserve()?;
        let path: PathBuf = path.to_path_buf();
        let edge = self.edge;

        let encoded = tokio::task::spawn_blocking(move || render_thumbnail(&path, edge))
            .await
            .ok()?;

        match encoded {
            Ok(bytes) => Some(PreviewHandle {
                bytes: Arc::new(bytes),
                _slot: slot,
            }),
            Err(e) => {
                debug!("生成预览失败，跳过: {}", e);
                None
            }
        }
    }

    /// 用已编码的字节直接构建预览（名额已满时返回 None）
    pub fn from_encoded(&self, bytes: Vec<u8>) -> Option<PreviewHandle> {
        let slot = self.try_reserve()?;
        Some(PreviewHandle {
            bytes: Arc::new(bytes),
            _slot: slot,
        })
    }
}

fn render_thumbnail(path: &Path, edge: u32) -> anyhow::Result<Vec<u8>> {
    let img = image::open(path)?;
    let thumb = DynamicImage::ImageRgb8(img.thumbnail(edge, edge).to_rgb8());
    let mut buf = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(80))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_budget_caps_live_previews() {
        let budget = PreviewBudget::new(2, 64);
        let a = budget.from_encoded(vec![1]);
        let b = budget.from_encoded(vec![2]);
        let c = budget.from_encoded(vec![3]);
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(budget.live(), 2);

        drop(a);
        assert_eq!(budget.live(), 1);
        assert!(budget.from_encoded(vec![4]).is_some());
    }

    #[tokio::test]
    async fn test_generate_thumbnail_from_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.png");
        RgbImage::from_pixel(400, 200, Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let budget = PreviewBudget::new(4, 64);
        let preview = budget.generate(&path).await.expect("preview");
        let decoded = image::load_from_memory(&preview.bytes()).unwrap();
        assert!(decoded.width() <= 64 && decoded.height() <= 64);
        assert_eq!(budget.live(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_file_releases_slot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let budget = PreviewBudget::new(1, 64);
        assert!(budget.generate(&path).await.is_none());
        assert_eq!(budget.live(), 0);
    }
}
