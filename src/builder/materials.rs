//! Builder materials and texture loading.

use super::BuildContext;
use crate::document::{AlphaMode, Image, Material, Sampler, Texture, TextureRef};
use crate::types::{hex_to_linear, FloorLayer, PerimeterLayer, TextureBinding, TextureKind};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const FLOOR_COLOR: &str = "#ffffff";
const LAYER_COLOR: &str = "#cccccc";
const PERIMETER_COLOR: &str = "#94a3b8";

const DEFAULT_PBR_ROUGHNESS: f32 = 0.9;
const DEFAULT_PBR_METALNESS: f32 = 0.0;
const DEFAULT_AO_STRENGTH: f32 = 1.2;
const DEFAULT_NORMAL_SCALE: f32 = 2.0;

/// Everything needed to produce one builder material.
struct SurfaceStyle<'s> {
    name: String,
    color: Option<&'s str>,
    default_color: &'static str,
    roughness: f32,
    metallic: f32,
    opacity: f32,
    texture_id: Option<i64>,
    texture_url: Option<&'s str>,
    overrides: Option<&'s TextureBinding>,
}

impl BuildContext<'_> {
    pub(super) fn floor_material(&mut self) -> usize {
        let snapshot = self.snapshot;
        let scene = &snapshot.scene;
        let texture = scene.floor_texture.as_ref();
        self.surface_material(SurfaceStyle {
            name: "FloorMaterial".to_string(),
            color: scene.floor_color.as_deref(),
            default_color: FLOOR_COLOR,
            roughness: 0.8,
            metallic: 0.1,
            opacity: 1.0,
            texture_id: texture.and_then(|t| t.id),
            texture_url: texture.and_then(|t| t.url.as_deref()),
            overrides: texture,
        })
    }

    pub(super) fn layer_material(&mut self, layer: &FloorLayer, rank: usize) -> usize {
        let texture = layer.texture.as_ref();
        self.surface_material(SurfaceStyle {
            name: format!("LayerMat_{}", rank),
            color: layer.color.as_deref(),
            default_color: LAYER_COLOR,
            roughness: 0.8,
            metallic: 0.1,
            opacity: layer.opacity.clamp(0.0, 1.0),
            texture_id: texture.and_then(|t| t.id),
            texture_url: texture.and_then(|t| t.url.as_deref()),
            overrides: texture,
        })
    }

    pub(super) fn perimeter_material(&mut self, layer: &PerimeterLayer) -> usize {
        self.surface_material(SurfaceStyle {
            name: format!("PerimeterMat_{}", layer.kind_name()),
            color: layer.color.as_deref(),
            default_color: PERIMETER_COLOR,
            roughness: 0.9,
            metallic: 0.1,
            opacity: 1.0,
            texture_id: layer.texture_id,
            texture_url: layer.texture_url.as_deref(),
            overrides: None,
        })
    }

    /// Double-sided material, textured when possible and flat-coloured otherwise.
    fn surface_material(&mut self, style: SurfaceStyle<'_>) -> usize {
        let mut material = Material {
            name: Some(style.name.clone()),
            roughness: style.roughness,
            metallic: style.metallic,
            double_sided: true,
            ..Default::default()
        };

        let wants_texture = style.texture_id.is_some() || style.texture_url.is_some();
        let mut textured = false;
        if let Some(id) = style.texture_id {
            textured = self.apply_texture_record(&mut material, id, style.overrides);
        }
        if !textured {
            if let Some(url) = style.texture_url {
                if let Some(texture) = self.texture_for(url) {
                    material.base_color_texture = Some(TextureRef::new(texture));
                    textured = true;
                }
            }
        }
        if wants_texture && !textured {
            self.warn(format!("{}: texture unavailable, using flat colour", style.name));
        }

        // Textures are shown untinted.
        let rgb = if textured {
            [1.0, 1.0, 1.0]
        } else {
            style
                .color
                .and_then(hex_to_linear)
                .or_else(|| hex_to_linear(style.default_color))
                .unwrap_or([1.0, 1.0, 1.0])
        };
        material.base_color = [rgb[0], rgb[1], rgb[2], style.opacity];
        if style.opacity < 1.0 {
            material.alpha_mode = AlphaMode::Blend;
        }

        self.doc.add_material(material)
    }

    /// Attach the maps of a texture library record. Returns `true` when a
    /// colour map was attached; without one the material is left untouched.
    fn apply_texture_record(&mut self, material: &mut Material, id: i64, overrides: Option<&TextureBinding>) -> bool {
        let snapshot = self.snapshot;
        let Some(record) = snapshot.textures.get(&id) else {
            self.warn(format!("texture record {} not found", id));
            return false;
        };

        let Some(color) = record.color_url().and_then(|url| self.texture_for(url)) else {
            return false;
        };
        material.base_color_texture = Some(TextureRef::new(color));
        if record.kind == TextureKind::Simple {
            return true;
        }

        // Caller overrides win over the record's own values.
        material.roughness = overrides
            .and_then(|o| o.roughness)
            .or(record.roughness)
            .unwrap_or(DEFAULT_PBR_ROUGHNESS);
        material.metallic = overrides
            .and_then(|o| o.metalness)
            .or(record.metalness)
            .unwrap_or(DEFAULT_PBR_METALNESS);

        if let Some(texture) = record.normal_url.as_deref().and_then(|url| self.texture_for(url)) {
            material.normal_texture = Some(TextureRef::new(texture));
            material.normal_scale = overrides
                .and_then(|o| o.normal_scale)
                .or(record.normal_scale)
                .unwrap_or(DEFAULT_NORMAL_SCALE);
        }

        if let Some(texture) = record.ao_url.as_deref().and_then(|url| self.texture_for(url)) {
            material.occlusion_texture = Some(TextureRef::new(texture));
            material.occlusion_strength = overrides
                .and_then(|o| o.ao_intensity)
                .or(record.ao_intensity)
                .unwrap_or(DEFAULT_AO_STRENGTH);
        }

        let roughness_url = record.roughness_url.as_deref();
        let metallic_url = record.metallic_url.as_deref();
        if roughness_url.is_some() || metallic_url.is_some() {
            if let Some(packed) = self.packed_metallic_roughness(roughness_url, metallic_url) {
                material.metallic_roughness_texture = Some(TextureRef::new(packed));
            }
        }

        true
    }

    /// Texture index for an image URL, loading and caching it on first use.
    fn texture_for(&mut self, url: &str) -> Option<usize> {
        if let Some(cached) = self.texture_cache.get(url) {
            return *cached;
        }
        let texture = match self.textures.load(url) {
            Some(data) => match embeddable(data.bytes, &data.mime_type) {
                Ok((bytes, mime_type)) => Some(self.add_image_texture(url, bytes, mime_type)),
                Err(e) => {
                    self.warn(format!("texture {} could not be decoded: {}", url, e));
                    None
                }
            },
            None => {
                self.warn(format!("texture {} not found", url));
                None
            }
        };
        self.texture_cache.insert(url.to_string(), texture);
        texture
    }

    fn add_image_texture(&mut self, url: &str, bytes: Vec<u8>, mime_type: String) -> usize {
        let name = url.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string);
        let image = self.doc.add_image(Image {
            name: name.clone(),
            mime_type,
            data: bytes,
        });
        let sampler = self.repeat_sampler();
        self.doc.add_texture(Texture {
            name,
            image,
            sampler: Some(sampler),
        })
    }

    /// One REPEAT/REPEAT sampler shared by every builder texture.
    fn repeat_sampler(&mut self) -> usize {
        match self.sampler {
            Some(s) => s,
            None => {
                let s = self.doc.add_sampler(Sampler::repeat());
                self.sampler = Some(s);
                s
            }
        }
    }

    /// Pack separate roughness and metallic maps into one glTF
    /// metallic-roughness image (G = roughness, B = metallic).
    fn packed_metallic_roughness(
        &mut self,
        roughness_url: Option<&str>,
        metallic_url: Option<&str>,
    ) -> Option<usize> {
        let key = format!("mr:{}|{}", roughness_url.unwrap_or(""), metallic_url.unwrap_or(""));
        let load = |ctx: &mut Self, url: Option<&str>| -> Option<DynamicImage> {
            let url = url?;
            let data = ctx.textures.load(url)?;
            match image::load_from_memory(&data.bytes) {
                Ok(img) => Some(img),
                Err(e) => {
                    ctx.warn(format!("texture {} could not be decoded: {}", url, e));
                    None
                }
            }
        };

        if let Some(cached) = self.packed_maps.get(&key) {
            return *cached;
        }

        let roughness = load(self, roughness_url);
        let metallic = load(self, metallic_url);
        if roughness.is_none() && metallic.is_none() {
            self.warn(format!("metallic-roughness maps for {} unavailable", key.trim_start_matches("mr:")));
            self.packed_maps.insert(key, None);
            return None;
        }

        let packed = pack_channels(roughness.as_ref(), metallic.as_ref());
        let mut bytes = Vec::new();
        if let Err(e) = DynamicImage::ImageRgb8(packed).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png) {
            self.warn(format!("metallic-roughness map could not be encoded: {}", e));
            self.packed_maps.insert(key, None);
            return None;
        }

        let name = roughness_url.or(metallic_url).unwrap_or("metallicRoughness");
        let texture = self.add_image_texture(name, bytes, "image/png".to_string());
        self.packed_maps.insert(key, Some(texture));
        Some(texture)
    }
}

/// Combine single-channel maps into RGB. A missing channel is filled with
/// 255 so only the material factor applies. The metallic map is
/// resized to the roughness map when both are present.
fn pack_channels(roughness: Option<&DynamicImage>, metallic: Option<&DynamicImage>) -> RgbImage {
    let (width, height) = roughness
        .or(metallic)
        .map(|img| img.dimensions())
        .unwrap_or((1, 1));
    let channel = |img: Option<&DynamicImage>| {
        img.map(|img| {
            let luma = img.to_luma8();
            if luma.dimensions() == (width, height) {
                luma
            } else {
                image::imageops::resize(&luma, width, height, image::imageops::FilterType::Triangle)
            }
        })
    };
    let g = channel(roughness);
    let b = channel(metallic);

    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            255,
            g.as_ref().map_or(255, |img| img.get_pixel(x, y)[0]),
            b.as_ref().map_or(255, |img| img.get_pixel(x, y)[0]),
        ])
    })
}

/// glTF core only embeds PNG and JPEG; anything else is re-encoded as PNG.
fn embeddable(bytes: Vec<u8>, mime_type: &str) -> image::ImageResult<(Vec<u8>, String)> {
    if mime_type == "image/png" || mime_type == "image/jpeg" {
        return Ok((bytes, mime_type.to_string()));
    }
    let img = image::load_from_memory(&bytes)?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok((png, "image/png".to_string()))
}
