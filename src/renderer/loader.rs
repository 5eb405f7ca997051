//! Background texture loading. Decoding runs on the rayon pool; the render
//! thread drains finished images once per frame and hot-swaps them over
//! their placeholders.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};

use log::{info, warn};

use super::cache::ResourceCache;
use super::texture::{DecodedImage, Texture};

type DecodeResult = (PathBuf, Result<DecodedImage, String>);

pub struct TextureLoader {
    tx: Sender<DecodeResult>,
    rx: Receiver<DecodeResult>,
    in_flight: HashSet<PathBuf>,
}

impl Default for TextureLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureLoader {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    /// Queue a decode. Duplicate requests while one is in flight are ignored.
    pub fn request(&mut self, path: PathBuf, srgb: bool) {
        if !self.in_flight.insert(path.clone()) {
            return;
        }
        info!("Loading texture: {:?}", path);
        let tx = self.tx.clone();
        rayon::spawn(move || {
            let result = DecodedImage::decode(&path, srgb);
            // The receiver only disappears on shutdown.
            let _ = tx.send((path, result));
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Upload every finished decode and swap it into the cache. Failed
    /// decodes keep their placeholder and log once. Returns how many
    /// textures were swapped.
    pub fn drain(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        textures: &mut ResourceCache<PathBuf, Texture>,
    ) -> usize {
        let mut swapped = 0;
        while let Ok((path, result)) = self.rx.try_recv() {
            self.in_flight.remove(&path);
            match result {
                Ok(image) => {
                    let texture = Texture::upload(device, queue, &image);
                    let bytes = texture.byte_size();
                    if textures.replace(&path, texture, bytes) {
                        swapped += 1;
                    } else {
                        // Every reference was released while the decode ran.
                        info!("Discarding decoded texture {:?}: no longer referenced", path);
                    }
                }
                Err(err) => warn!("Texture load failed, keeping placeholder: {err}"),
            }
        }
        swapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_requests_are_coalesced() {
        let mut loader = TextureLoader::new();
        let path = PathBuf::from("/nonexistent/texture.png");
        loader.request(path.clone(), true);
        loader.request(path, true);
        assert_eq!(loader.in_flight(), 1);
    }
}
