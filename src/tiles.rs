use egui::{ColorImage, TextureHandle};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use walkers::sources::TileSource;
use walkers::TileId;

use map_elements::geo::WebMercator;

const CACHE_DURATION_DAYS: u64 = 7;

/// Get cache filename based on hash of URL
fn cache_filename(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hasher.finalize();
    format!("{:x}", hash)
}

pub enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

/// Texture cache for every raster the document needs: map tiles and marker
/// icon images. Keyed by resolved URL so layers sharing a source share
/// textures, with a disk cache behind the in-memory map.
pub struct TileManager {
    cache_dir: PathBuf,
    offline: bool,
    tiles: Arc<Mutex<HashMap<String, TileState>>>,
    download_queue: Arc<Mutex<Vec<String>>>,
}

impl TileManager {
    pub fn new(offline: bool) -> Self {
        let cache_dir = Self::get_cache_dir();

        // Create cache directory if it doesn't exist
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create cache directory: {}", e);
        }

        // Clean up old tiles
        Self::cleanup_old_tiles(&cache_dir);

        Self {
            cache_dir,
            offline,
            tiles: Arc::new(Mutex::new(HashMap::new())),
            download_queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn get_cache_dir() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        path.push("leafmark");
        path.push("tiles");
        path
    }

    fn cleanup_old_tiles(cache_dir: &Path) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        if let Ok(entries) = fs::read_dir(cache_dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if let Ok(modified) = metadata.modified() {
                        if let Ok(age) = now.duration_since(modified) {
                            if age > max_age {
                                let _ = fs::remove_file(entry.path());
                                debug!("Removed old tile cache: {:?}", entry.path());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Get a tile from cache or queue it for download
    pub fn get_tile(
        &self,
        source: &dyn TileSource,
        coord: TileId,
        ctx: &egui::Context,
    ) -> Option<TextureHandle> {
        self.lookup(source.tile_url(coord), ctx)
    }

    /// Get an arbitrary image (marker icons) through the same cache
    pub fn get_image(&self, url: &str, ctx: &egui::Context) -> Option<TextureHandle> {
        self.lookup(url.to_string(), ctx)
    }

    fn lookup(&self, url: String, ctx: &egui::Context) -> Option<TextureHandle> {
        let mut tiles = self.tiles.lock().unwrap();

        match tiles.get(&url) {
            Some(TileState::Loaded(texture)) => Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => None,
            None => {
                // Check if we have it in disk cache
                let cache_path = self.cache_dir.join(format!("{}.png", cache_filename(&url)));

                if cache_path.exists() {
                    // Load from cache
                    match Self::load_from_disk(&cache_path, &url, ctx) {
                        Ok(texture) => {
                            tiles.insert(url, TileState::Loaded(texture.clone()));
                            Some(texture)
                        }
                        Err(e) => {
                            warn!("Failed to load cached tile: {}", e);
                            if self.offline {
                                tiles.insert(url, TileState::Failed);
                            } else {
                                tiles.insert(url.clone(), TileState::Loading);
                                self.queue_download(url, ctx.clone());
                            }
                            None
                        }
                    }
                } else if self.offline {
                    tiles.insert(url, TileState::Failed);
                    None
                } else {
                    // Need to download
                    tiles.insert(url.clone(), TileState::Loading);
                    self.queue_download(url, ctx.clone());
                    None
                }
            }
        }
    }

    fn load_from_disk(path: &Path, url: &str, ctx: &egui::Context) -> Result<TextureHandle, String> {
        let img_data = fs::read(path).map_err(|e| e.to_string())?;
        let img = image::load_from_memory(&img_data).map_err(|e| e.to_string())?;
        let rgba = img.to_rgba8();
        // Retina tiles and icon images come in arbitrary sizes
        let size = [rgba.width() as usize, rgba.height() as usize];

        let color_image = ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw());
        Ok(ctx.load_texture(url.to_string(), color_image, Default::default()))
    }

    fn queue_download(&self, url: String, ctx: egui::Context) {
        let mut queue = self.download_queue.lock().unwrap();
        if !queue.contains(&url) {
            queue.push(url.clone());

            // Spawn download task
            let tiles = self.tiles.clone();
            let cache_dir = self.cache_dir.clone();

            std::thread::spawn(move || {
                Self::download(url, tiles, cache_dir, ctx);
            });
        }
    }

    fn download(
        url: String,
        tiles: Arc<Mutex<HashMap<String, TileState>>>,
        cache_dir: PathBuf,
        ctx: egui::Context,
    ) {
        debug!("Downloading tile: {}", url);

        match reqwest::blocking::get(&url) {
            Ok(response) => {
                if response.status().is_success() {
                    match response.bytes() {
                        Ok(bytes) => {
                            // Save to cache
                            let cache_path =
                                cache_dir.join(format!("{}.png", cache_filename(&url)));
                            if let Err(e) = fs::write(&cache_path, &bytes) {
                                warn!("Failed to save tile to cache: {}", e);
                            }

                            // Load into texture
                            match image::load_from_memory(&bytes) {
                                Ok(img) => {
                                    let rgba = img.to_rgba8();
                                    let size = [rgba.width() as usize, rgba.height() as usize];
                                    let color_image =
                                        ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw());

                                    let texture = ctx.load_texture(
                                        url.clone(),
                                        color_image,
                                        Default::default(),
                                    );

                                    let mut tiles_lock = tiles.lock().unwrap();
                                    tiles_lock.insert(url, TileState::Loaded(texture));
                                    ctx.request_repaint();
                                }
                                Err(e) => {
                                    warn!("Failed to decode tile image: {}", e);
                                    let mut tiles_lock = tiles.lock().unwrap();
                                    tiles_lock.insert(url, TileState::Failed);
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Failed to read tile bytes: {}", e);
                            let mut tiles_lock = tiles.lock().unwrap();
                            tiles_lock.insert(url, TileState::Failed);
                        }
                    }
                } else {
                    warn!("Failed to download tile: HTTP {}", response.status());
                    let mut tiles_lock = tiles.lock().unwrap();
                    tiles_lock.insert(url, TileState::Failed);
                }
            }
            Err(e) => {
                warn!("Failed to fetch tile: {}", e);
                let mut tiles_lock = tiles.lock().unwrap();
                tiles_lock.insert(url, TileState::Failed);
            }
        }
    }

    /// Get all tiles needed for a viewport centered on the given position
    pub fn get_visible_tiles(
        &self,
        center_lat: f64,
        center_lon: f64,
        zoom: u8,
        viewport_width: f32,
        viewport_height: f32,
        tile_size: u32,
        wrap: bool,
    ) -> Vec<(TileId, f32, f32)> {
        let mut tiles = Vec::new();

        // Calculate center tile
        let center_tile_x = WebMercator::lon_to_x(center_lon, zoom);
        let center_tile_y = WebMercator::lat_to_y(center_lat, zoom);

        // Calculate how many tiles we need in each direction
        let tiles_wide = (viewport_width / tile_size as f32).ceil() as i32 + 2;
        let tiles_high = (viewport_height / tile_size as f32).ceil() as i32 + 2;

        let start_x = center_tile_x.floor() as i32 - tiles_wide / 2;
        let start_y = center_tile_y.floor() as i32 - tiles_high / 2;

        let max_tile = 2_i32.pow(u32::from(zoom));

        for dy in 0..tiles_high {
            for dx in 0..tiles_wide {
                let tile_x = start_x + dx;
                let tile_y = start_y + dy;

                // A no-wrap layer stops at the antimeridian
                if !wrap && (tile_x < 0 || tile_x >= max_tile) {
                    continue;
                }

                // Wrap X coordinate (longitude wraps around)
                let wrapped_x = ((tile_x % max_tile) + max_tile) % max_tile;

                // Clamp Y coordinate (latitude doesn't wrap)
                if tile_y >= 0 && tile_y < max_tile {
                    let coord = TileId {
                        x: wrapped_x as u32,
                        y: tile_y as u32,
                        zoom,
                    };

                    // Calculate screen position offset from center
                    let offset_x = (f64::from(tile_x) - center_tile_x) * f64::from(tile_size);
                    let offset_y = (f64::from(tile_y) - center_tile_y) * f64::from(tile_size);

                    tiles.push((coord, offset_x as f32, offset_y as f32));
                }
            }
        }

        tiles
    }

    pub fn has_loading_tiles(&self) -> bool {
        let tiles = self.tiles.lock().unwrap();
        tiles.values().any(|state| matches!(state, TileState::Loading))
    }

    pub fn get_error_count(&self) -> usize {
        let tiles = self.tiles.lock().unwrap();
        tiles.values().filter(|state| matches!(state, TileState::Failed)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_filename_is_stable_hash() {
        let a = cache_filename("https://a.tile.openstreetmap.org/3/1/2.png");
        let b = cache_filename("https://a.tile.openstreetmap.org/3/1/2.png");
        let c = cache_filename("https://b.tile.openstreetmap.org/3/1/2.png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // sha256 hex digest
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_visible_tiles_cover_viewport() {
        let manager = TileManager::new(true);
        let tiles = manager.get_visible_tiles(51.505, -0.09, 13, 800.0, 600.0, 256, true);

        // 800/256 -> 4 wide + 2 margin, 600/256 -> 3 high + 2 margin
        assert_eq!(tiles.len(), 6 * 5);
        for (coord, _, _) in &tiles {
            assert_eq!(coord.zoom, 13);
            assert!(coord.x < 8192);
            assert!(coord.y < 8192);
        }
    }

    #[test]
    fn test_visible_tiles_wrap_longitude() {
        let manager = TileManager::new(true);
        // Viewport straddling the antimeridian
        let tiles = manager.get_visible_tiles(0.0, 179.9, 2, 800.0, 600.0, 256, true);

        assert!(!tiles.is_empty());
        for (coord, _, _) in &tiles {
            assert!(coord.x < 4);
        }
    }

    #[test]
    fn test_visible_tiles_no_wrap_stops_at_edge() {
        let manager = TileManager::new(true);
        let wrapped = manager.get_visible_tiles(0.0, 179.9, 2, 800.0, 600.0, 256, true);
        let clipped = manager.get_visible_tiles(0.0, 179.9, 2, 800.0, 600.0, 256, false);

        assert!(clipped.len() < wrapped.len());
    }

    #[test]
    fn test_visible_tiles_clamp_latitude() {
        let manager = TileManager::new(true);
        // Near the pole, rows past the top of the world are dropped
        let tiles = manager.get_visible_tiles(84.0, 0.0, 3, 800.0, 600.0, 256, true);

        for (coord, _, _) in &tiles {
            assert!(coord.y < 8);
        }
    }
}
