use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use crate::bridge::alloc::GuestAllocator;
use crate::bridge::heap::HostImports;
use crate::bridge::memory::LinearMemory;
use crate::bridge::module::RasterModule;
use crate::bridge::options::{FitTo, RenderOptions};
use crate::foundation::error::{CardError, CardResult};

/// Largest pixmap edge the guest will allocate.
pub const MAX_DIM: u32 = 16_384;

/// Size of the per-object header block in linear memory.
const OBJECT_HEADER: u32 = 8;

/// Integer-only export surface of a rasterizer guest.
///
/// Pointers and lengths are `u32` offsets into [`GuestExports::memory`]. Fallible exports write
/// their result into a caller-reserved slot at `retptr`: `(value, err_handle, is_err)` or
/// `(ptr, len, err_handle, is_err)`, each an `i32`. An `Err` return from any export is a trap; the
/// guest's state is unspecified afterwards.
pub trait GuestExports {
    /// Guest linear memory.
    fn memory(&self) -> &LinearMemory;
    /// Guest linear memory, mutably (the host writes arguments here).
    fn memory_mut(&mut self) -> &mut LinearMemory;

    /// Move the shadow-stack pointer; returns the new pointer.
    fn add_to_stack_pointer(&mut self, delta: i32) -> CardResult<u32>;
    /// Allocate guest memory.
    fn malloc(&mut self, size: u32, align: u32) -> CardResult<u32>;
    /// Resize guest memory.
    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32, align: u32) -> CardResult<u32>;
    /// Release guest memory.
    fn free(&mut self, ptr: u32, size: u32, align: u32) -> CardResult<()>;

    /// Parse an SVG. Takes ownership of both input buffers.
    ///
    /// Slot: `(renderer, err_handle, is_err)`.
    fn renderer_new(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        svg_ptr: u32,
        svg_len: u32,
        opts_ptr: u32,
        opts_len: u32,
    ) -> CardResult<()>;
    /// Parse an SVG held by the host as an object. Takes ownership of the handle and the options
    /// buffer.
    ///
    /// Slot: `(renderer, err_handle, is_err)`.
    fn renderer_new_from_object(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        svg_handle: u32,
        opts_ptr: u32,
        opts_len: u32,
    ) -> CardResult<()>;
    /// Rasterize a parsed SVG.
    ///
    /// Slot: `(image, err_handle, is_err)`.
    fn renderer_render(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        renderer: u32,
    ) -> CardResult<()>;
    /// Intrinsic document width.
    fn renderer_width(&self, renderer: u32) -> CardResult<f32>;
    /// Intrinsic document height.
    fn renderer_height(&self, renderer: u32) -> CardResult<f32>;
    /// Bounding box of the drawn content, `0` when there is none.
    fn renderer_inner_bbox(&mut self, renderer: u32) -> CardResult<u32>;
    /// Release a renderer.
    fn renderer_free(&mut self, renderer: u32) -> CardResult<()>;

    /// Pixel width of a rendered image.
    fn image_width(&self, image: u32) -> CardResult<u32>;
    /// Pixel height of a rendered image.
    fn image_height(&self, image: u32) -> CardResult<u32>;
    /// Encode a rendered image as PNG into a fresh guest buffer the caller must free.
    ///
    /// Slot: `(ptr, len, err_handle, is_err)`.
    fn image_as_png(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        image: u32,
    ) -> CardResult<()>;
    /// Release an image and its pixels.
    fn image_free(&mut self, image: u32) -> CardResult<()>;

    /// Bounding-box left edge.
    fn bbox_x(&self, bbox: u32) -> CardResult<f32>;
    /// Bounding-box top edge.
    fn bbox_y(&self, bbox: u32) -> CardResult<f32>;
    /// Bounding-box width.
    fn bbox_width(&self, bbox: u32) -> CardResult<f32>;
    /// Bounding-box height.
    fn bbox_height(&self, bbox: u32) -> CardResult<f32>;
    /// Release a bounding box.
    fn bbox_free(&mut self, bbox: u32) -> CardResult<()>;

    /// Live guest objects, for leak checks.
    fn live_objects(&self) -> usize;
}

enum GuestObject {
    Renderer {
        tree: Box<usvg::Tree>,
        options: RenderOptions,
    },
    Image {
        width: u32,
        height: u32,
        pixels: u32,
    },
    BBox {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

impl GuestObject {
    fn kind(&self) -> &'static str {
        match self {
            GuestObject::Renderer { .. } => "renderer",
            GuestObject::Image { .. } => "image",
            GuestObject::BBox { .. } => "bbox",
        }
    }
}

/// Rasterizer guest backed by `usvg`/`resvg`.
///
/// Parsed trees live on the Rust side keyed by their header address; pixel data lives in linear
/// memory, so large renders are bounded by the module's page limit.
pub struct ResvgGuest {
    module: Arc<RasterModule>,
    memory: LinearMemory,
    alloc: GuestAllocator,
    objects: BTreeMap<u32, GuestObject>,
}

impl ResvgGuest {
    /// Instantiate with fresh memory sized by `module`.
    pub fn new(module: Arc<RasterModule>) -> CardResult<Self> {
        let memory = LinearMemory::new(module.initial_pages(), module.max_pages())?;
        Ok(Self {
            module,
            memory,
            alloc: GuestAllocator::new(),
            objects: BTreeMap::new(),
        })
    }

    /// Allocator counters.
    pub fn alloc_stats(&self) -> crate::bridge::alloc::AllocStats {
        self.alloc.stats()
    }

    fn new_object(&mut self, object: GuestObject) -> CardResult<u32> {
        let ptr = self.alloc.malloc(&mut self.memory, OBJECT_HEADER, 8)?;
        self.objects.insert(ptr, object);
        Ok(ptr)
    }

    fn object(&self, ptr: u32, kind: &'static str) -> CardResult<&GuestObject> {
        match self.objects.get(&ptr) {
            Some(obj) if obj.kind() == kind => Ok(obj),
            Some(obj) => Err(CardError::trap(format!(
                "expected {kind} at {ptr:#x}, found {}",
                obj.kind()
            ))),
            None => Err(CardError::trap(format!("null or dangling {kind} pointer {ptr:#x}"))),
        }
    }

    fn drop_object(&mut self, ptr: u32, kind: &'static str) -> CardResult<GuestObject> {
        self.object(ptr, kind)?;
        let obj = self
            .objects
            .remove(&ptr)
            .ok_or_else(|| CardError::trap(format!("dangling {kind} pointer {ptr:#x}")))?;
        self.alloc.free(ptr, OBJECT_HEADER, 8)?;
        Ok(obj)
    }

    /// Read and release an input buffer the export took ownership of.
    fn consume(&mut self, ptr: u32, len: u32) -> CardResult<Vec<u8>> {
        let bytes = self
            .memory
            .slice(ptr, len)
            .ok_or_else(|| CardError::trap(format!("argument of {len} bytes at {ptr:#x}")))?
            .to_vec();
        self.alloc.free(ptr, len, 1)?;
        Ok(bytes)
    }

    /// Hand an error message to the host and return its handle.
    fn raise(&mut self, host: &mut dyn HostImports, msg: &str) -> CardResult<u32> {
        let len = u32::try_from(msg.len()).map_err(|_| CardError::trap("error message too long"))?;
        let ptr = self.alloc.malloc(&mut self.memory, len, 1)?;
        self.memory.write(ptr, msg.as_bytes())?;
        let handle = host.string_new(&self.memory, ptr, len);
        self.alloc.free(ptr, len, 1)?;
        handle
    }

    fn write_slot(&mut self, retptr: u32, words: &[i32]) -> CardResult<()> {
        for (i, w) in words.iter().enumerate() {
            self.memory.write_i32(retptr + 4 * i as u32, *w)?;
        }
        Ok(())
    }

    fn finish_value(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        result: Result<u32, String>,
    ) -> CardResult<()> {
        match result {
            Ok(value) => self.write_slot(retptr, &[value as i32, 0, 0]),
            Err(msg) => {
                let handle = self.raise(host, &msg)?;
                self.write_slot(retptr, &[0, handle as i32, 1])
            }
        }
    }

    fn parse(&mut self, svg: &[u8], opts: &[u8]) -> CardResult<Result<u32, String>> {
        let options: RenderOptions = match serde_json::from_slice(opts) {
            Ok(o) => o,
            Err(e) => return Ok(Err(format!("invalid render options: {e}"))),
        };
        let mut usvg_opts = usvg::Options {
            fontdb: self.module.fonts(),
            ..Default::default()
        };
        if let Some(family) = options
            .font
            .default_family
            .clone()
            .or_else(|| self.module.default_family().map(str::to_owned))
        {
            usvg_opts.font_family = family;
        }
        let tree = match usvg::Tree::from_data(svg, &usvg_opts) {
            Ok(t) => t,
            Err(e) => return Ok(Err(format!("parse svg: {e}"))),
        };
        self.new_object(GuestObject::Renderer {
            tree: Box::new(tree),
            options,
        })
        .map(Ok)
    }
}

impl GuestExports for ResvgGuest {
    fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }

    fn add_to_stack_pointer(&mut self, delta: i32) -> CardResult<u32> {
        self.alloc.add_to_stack_pointer(delta)
    }

    fn malloc(&mut self, size: u32, align: u32) -> CardResult<u32> {
        self.alloc.malloc(&mut self.memory, size, align)
    }

    fn realloc(&mut self, ptr: u32, old_size: u32, new_size: u32, align: u32) -> CardResult<u32> {
        self.alloc
            .realloc(&mut self.memory, ptr, old_size, new_size, align)
    }

    fn free(&mut self, ptr: u32, size: u32, align: u32) -> CardResult<()> {
        self.alloc.free(ptr, size, align)
    }

    fn renderer_new(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        svg_ptr: u32,
        svg_len: u32,
        opts_ptr: u32,
        opts_len: u32,
    ) -> CardResult<()> {
        let svg = self.consume(svg_ptr, svg_len)?;
        let opts = self.consume(opts_ptr, opts_len)?;
        let result = self.parse(&svg, &opts)?;
        self.finish_value(host, retptr, result)
    }

    fn renderer_new_from_object(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        svg_handle: u32,
        opts_ptr: u32,
        opts_len: u32,
    ) -> CardResult<()> {
        let len = host.object_byte_len(svg_handle)?;
        let ptr = self.alloc.malloc(&mut self.memory, len, 1)?;
        host.object_copy_into(svg_handle, &mut self.memory, ptr)?;
        host.object_drop_ref(svg_handle)?;
        let svg = self.consume(ptr, len)?;
        let opts = self.consume(opts_ptr, opts_len)?;
        let result = self.parse(&svg, &opts)?;
        self.finish_value(host, retptr, result)
    }

    fn renderer_render(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        renderer: u32,
    ) -> CardResult<()> {
        let raster = match self.object(renderer, "renderer")? {
            GuestObject::Renderer { tree, options } => rasterize(tree, options),
            _ => return Err(CardError::trap("renderer kind mismatch")),
        };
        let (width, height, pixmap) = match raster {
            Ok(r) => r,
            Err(msg) => return self.finish_value(host, retptr, Err(msg)),
        };

        let data = pixmap.data();
        let len = u32::try_from(data.len()).map_err(|_| CardError::trap("pixmap exceeds memory"))?;
        let pixels = self.alloc.malloc(&mut self.memory, len, 4)?;
        self.memory.write(pixels, data)?;
        let image = self.new_object(GuestObject::Image {
            width,
            height,
            pixels,
        })?;
        tracing::debug!(width, height, pages = self.memory.pages(), "guest rasterized svg");
        self.finish_value(host, retptr, Ok(image))
    }

    fn renderer_width(&self, renderer: u32) -> CardResult<f32> {
        match self.object(renderer, "renderer")? {
            GuestObject::Renderer { tree, .. } => Ok(tree.size().width()),
            _ => Err(CardError::trap("renderer kind mismatch")),
        }
    }

    fn renderer_height(&self, renderer: u32) -> CardResult<f32> {
        match self.object(renderer, "renderer")? {
            GuestObject::Renderer { tree, .. } => Ok(tree.size().height()),
            _ => Err(CardError::trap("renderer kind mismatch")),
        }
    }

    fn renderer_inner_bbox(&mut self, renderer: u32) -> CardResult<u32> {
        let GuestObject::Renderer { tree, .. } = self.object(renderer, "renderer")? else {
            return Err(CardError::trap("renderer kind mismatch"));
        };
        let r = tree.root().abs_bounding_box();
        if !(r.width() > 0.0 || r.height() > 0.0) {
            return Ok(0);
        }
        let bbox = GuestObject::BBox {
            x: r.x(),
            y: r.y(),
            width: r.width(),
            height: r.height(),
        };
        self.new_object(bbox)
    }

    fn renderer_free(&mut self, renderer: u32) -> CardResult<()> {
        self.drop_object(renderer, "renderer").map(drop)
    }

    fn image_width(&self, image: u32) -> CardResult<u32> {
        match self.object(image, "image")? {
            GuestObject::Image { width, .. } => Ok(*width),
            _ => Err(CardError::trap("image kind mismatch")),
        }
    }

    fn image_height(&self, image: u32) -> CardResult<u32> {
        match self.object(image, "image")? {
            GuestObject::Image { height, .. } => Ok(*height),
            _ => Err(CardError::trap("image kind mismatch")),
        }
    }

    fn image_as_png(
        &mut self,
        host: &mut dyn HostImports,
        retptr: u32,
        image: u32,
    ) -> CardResult<()> {
        let GuestObject::Image {
            width,
            height,
            pixels,
        } = *self.object(image, "image")?
        else {
            return Err(CardError::trap("image kind mismatch"));
        };
        let len = width * height * 4;
        let mut rgba = self
            .memory
            .slice(pixels, len)
            .ok_or_else(|| CardError::trap("image pixels out of bounds"))?
            .to_vec();
        demultiply_rgba8_in_place(&mut rgba);

        match encode_png(width, height, rgba) {
            Ok(png) => {
                let len =
                    u32::try_from(png.len()).map_err(|_| CardError::trap("png exceeds memory"))?;
                let ptr = self.alloc.malloc(&mut self.memory, len, 1)?;
                self.memory.write(ptr, &png)?;
                self.write_slot(retptr, &[ptr as i32, len as i32, 0, 0])
            }
            Err(msg) => {
                let handle = self.raise(host, &msg)?;
                self.write_slot(retptr, &[0, 0, handle as i32, 1])
            }
        }
    }

    fn image_free(&mut self, image: u32) -> CardResult<()> {
        if let GuestObject::Image {
            width,
            height,
            pixels,
        } = self.drop_object(image, "image")?
        {
            self.alloc.free(pixels, width * height * 4, 4)?;
        }
        Ok(())
    }

    fn bbox_x(&self, bbox: u32) -> CardResult<f32> {
        bbox_field(self.object(bbox, "bbox")?, |x, _, _, _| x)
    }

    fn bbox_y(&self, bbox: u32) -> CardResult<f32> {
        bbox_field(self.object(bbox, "bbox")?, |_, y, _, _| y)
    }

    fn bbox_width(&self, bbox: u32) -> CardResult<f32> {
        bbox_field(self.object(bbox, "bbox")?, |_, _, w, _| w)
    }

    fn bbox_height(&self, bbox: u32) -> CardResult<f32> {
        bbox_field(self.object(bbox, "bbox")?, |_, _, _, h| h)
    }

    fn bbox_free(&mut self, bbox: u32) -> CardResult<()> {
        self.drop_object(bbox, "bbox").map(drop)
    }

    fn live_objects(&self) -> usize {
        self.objects.len()
    }
}

fn bbox_field(obj: &GuestObject, pick: impl Fn(f32, f32, f32, f32) -> f32) -> CardResult<f32> {
    match *obj {
        GuestObject::BBox {
            x,
            y,
            width,
            height,
        } => Ok(pick(x, y, width, height)),
        _ => Err(CardError::trap("bbox kind mismatch")),
    }
}

fn rasterize(
    tree: &usvg::Tree,
    options: &RenderOptions,
) -> Result<(u32, u32, resvg::tiny_skia::Pixmap), String> {
    let size = tree.size();
    let (width, height) = target_size(size.width(), size.height(), options.fit_to)?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| format!("cannot allocate {width}x{height} pixmap"))?;
    if let Some(bg) = options.background {
        pixmap.fill(resvg::tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, 255));
    }
    let xform = resvg::tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(tree, xform, &mut pixmap.as_mut());
    Ok((width, height, pixmap))
}

fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>, String> {
    let img = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| "pixel buffer does not match image size".to_string())?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| format!("encode png: {e}"))?;
    Ok(buf)
}

/// Output pixmap size for a document of `w`×`h` user units.
fn target_size(w: f32, h: f32, fit: FitTo) -> Result<(u32, u32), String> {
    if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
        return Err(format!("svg has invalid size {w}x{h}"));
    }
    let (tw, th) = match fit {
        FitTo::Original => (w, h),
        FitTo::Width(px) => (px as f32, h * px as f32 / w),
        FitTo::Height(px) => (w * px as f32 / h, px as f32),
        FitTo::Zoom(z) => (w * z, h * z),
    };
    if !(tw.is_finite() && th.is_finite() && tw > 0.0 && th > 0.0) {
        return Err(format!("invalid output size {tw}x{th}"));
    }
    let (pw, ph) = ((tw.ceil() as u32).max(1), (th.ceil() as u32).max(1));
    if pw > MAX_DIM || ph > MAX_DIM {
        return Err(format!(
            "raster size too large: {pw}x{ph} (max {MAX_DIM}x{MAX_DIM})"
        ));
    }
    Ok((pw, ph))
}

/// Premultiplied RGBA8 to straight alpha, as PNG expects.
fn demultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/guest.rs"]
mod tests;
