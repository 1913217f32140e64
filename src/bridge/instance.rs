use std::cell::RefCell;

use crate::bridge::guest::GuestExports;
use crate::bridge::heap::{Handle, HeapTable, HostValue};
use crate::bridge::marshal::{pass_json, pass_str, read_slot, take_bytes, with_scratch};
use crate::bridge::memory::MemoryViews;
use crate::bridge::options::RenderOptions;
use crate::foundation::error::{CardError, CardResult};

/// Initial size of the options JSON buffer.
const OPTIONS_HINT: usize = 96;

/// A finished render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPng {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Encoded PNG bytes.
    pub data: Vec<u8>,
}

/// Content bounds reported by [`Renderer::inner_bbox`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

struct Core {
    guest: Box<dyn GuestExports + Send>,
    heap: HeapTable,
    views: MemoryViews,
    poisoned: bool,
}

/// One guest instance plus the host state that belongs to it.
///
/// Not shareable across threads; the bridge hands instances out one caller at a time. A trap
/// poisons the instance and every later call fails.
pub struct Instance {
    core: RefCell<Core>,
}

impl Instance {
    /// Wrap a freshly instantiated guest.
    pub fn new(guest: Box<dyn GuestExports + Send>) -> Self {
        Self {
            core: RefCell::new(Core {
                guest,
                heap: HeapTable::new(),
                views: MemoryViews::new(),
                poisoned: false,
            }),
        }
    }

    /// Live heap-table entries.
    pub fn heap_live(&self) -> usize {
        self.core.borrow().heap.live()
    }

    /// Live guest objects (renderers, images, boxes).
    pub fn guest_objects(&self) -> usize {
        self.core.borrow().guest.live_objects()
    }

    /// Guest memory size in pages.
    pub fn memory_pages(&self) -> u32 {
        self.core.borrow().guest.memory().pages()
    }

    /// How often the host memory views were rebuilt.
    pub fn view_rebuilds(&self) -> u64 {
        self.core.borrow().views.rebuilds()
    }

    /// `true` after a trap.
    pub fn is_poisoned(&self) -> bool {
        self.core.borrow().poisoned
    }

    /// Render `svg` to PNG.
    ///
    /// Every heap handle and guest object created here is released before returning, whether the
    /// render succeeds or not.
    #[tracing::instrument(level = "debug", skip_all, fields(svg_bytes = svg.len()))]
    pub fn render(&self, svg: &str, opts: &RenderOptions) -> CardResult<RenderedPng> {
        let baseline = self.heap_live();
        let out = self.renderer(svg, opts).and_then(finish);
        self.check_baseline(baseline);
        out
    }

    /// Render SVG bytes (plain or gzip-compressed) passed to the guest as a host object.
    #[tracing::instrument(level = "debug", skip_all, fields(svg_bytes = svg.len()))]
    pub fn render_bytes(&self, svg: Vec<u8>, opts: &RenderOptions) -> CardResult<RenderedPng> {
        let baseline = self.heap_live();
        let out = self.renderer_from_bytes(svg, opts).and_then(finish);
        self.check_baseline(baseline);
        out
    }

    /// Parse `svg` into a guest renderer.
    pub fn renderer(&self, svg: &str, opts: &RenderOptions) -> CardResult<Renderer<'_>> {
        let ptr = self.call(|core| {
            let guest: &mut dyn GuestExports = core.guest.as_mut();
            let (svg_ptr, svg_len) = pass_str(&mut *guest, svg)?;
            let (opts_ptr, opts_len) = match pass_json(&mut *guest, opts, OPTIONS_HINT) {
                Ok(v) => v,
                Err(e) => {
                    let _ = guest.free(svg_ptr, svg_len, 1);
                    return Err(e);
                }
            };
            let (heap, views) = (&mut core.heap, &mut core.views);
            with_scratch(guest, |guest, retptr| {
                guest.renderer_new(&mut *heap, retptr, svg_ptr, svg_len, opts_ptr, opts_len)?;
                let [value, err, is_err] = read_slot::<3>(views, guest.memory(), retptr)?;
                take_result(heap, value, err, is_err)
            })
        })?;
        Ok(Renderer {
            instance: self,
            ptr,
        })
    }

    /// Parse SVG bytes held in the heap table into a guest renderer.
    pub fn renderer_from_bytes(
        &self,
        svg: Vec<u8>,
        opts: &RenderOptions,
    ) -> CardResult<Renderer<'_>> {
        let ptr = self.call(|core| {
            let handle = core.heap.insert(HostValue::Bytes(svg))?;
            let guest: &mut dyn GuestExports = core.guest.as_mut();
            let out = match pass_json(&mut *guest, opts, OPTIONS_HINT) {
                Ok((opts_ptr, opts_len)) => {
                    let (heap, views) = (&mut core.heap, &mut core.views);
                    with_scratch(guest, |guest, retptr| {
                        guest.renderer_new_from_object(
                            &mut *heap,
                            retptr,
                            handle.raw(),
                            opts_ptr,
                            opts_len,
                        )?;
                        let [value, err, is_err] = read_slot::<3>(views, guest.memory(), retptr)?;
                        take_result(heap, value, err, is_err)
                    })
                }
                Err(e) => Err(e),
            };
            // The guest owns the handle once called; release it if it never got that far.
            if core.heap.get(handle).is_ok() {
                core.heap.drop_ref(handle)?;
            }
            out
        })?;
        Ok(Renderer {
            instance: self,
            ptr,
        })
    }

    fn call<T>(&self, f: impl FnOnce(&mut Core) -> CardResult<T>) -> CardResult<T> {
        let mut core = self
            .core
            .try_borrow_mut()
            .map_err(|_| CardError::marshal("instance re-entered during a guest call"))?;
        if core.poisoned {
            return Err(CardError::trap("instance is poisoned by an earlier trap"));
        }
        let out = f(&mut core);
        if let Err(CardError::GuestTrap(msg)) = &out {
            tracing::warn!(error = %msg, "guest trapped; instance poisoned");
            core.poisoned = true;
        }
        out
    }

    fn check_baseline(&self, baseline: usize) {
        let live = self.heap_live();
        if live != baseline {
            tracing::warn!(baseline, live, "heap table did not return to its baseline");
        }
    }
}

fn take_result(heap: &mut HeapTable, value: i32, err: i32, is_err: i32) -> CardResult<u32> {
    if is_err != 0 {
        let msg = heap.take_string(Handle::from_raw(err as u32))?;
        return Err(CardError::guest(msg));
    }
    if value == 0 {
        return Err(CardError::marshal("guest returned a null object"));
    }
    Ok(value as u32)
}

fn finish(mut renderer: Renderer<'_>) -> CardResult<RenderedPng> {
    let mut image = renderer.render()?;
    renderer.free()?;
    let width = image.width()?;
    let height = image.height()?;
    let data = image.to_png()?;
    image.free()?;
    Ok(RenderedPng {
        width,
        height,
        data,
    })
}

/// A parsed SVG living in the guest.
///
/// [`Renderer::free`] releases it and may be called any number of times; dropping it does the same.
pub struct Renderer<'i> {
    instance: &'i Instance,
    ptr: u32,
}

impl<'i> Renderer<'i> {
    /// `true` once released.
    pub fn is_freed(&self) -> bool {
        self.ptr == 0
    }

    /// Intrinsic document width in user units.
    pub fn width(&self) -> CardResult<f32> {
        let ptr = self.live_ptr()?;
        self.instance.call(|core| core.guest.renderer_width(ptr))
    }

    /// Intrinsic document height in user units.
    pub fn height(&self) -> CardResult<f32> {
        let ptr = self.live_ptr()?;
        self.instance.call(|core| core.guest.renderer_height(ptr))
    }

    /// Bounds of the drawn content, if any.
    pub fn inner_bbox(&self) -> CardResult<Option<BBox<'i>>> {
        let ptr = self.live_ptr()?;
        let bbox = self.instance.call(|core| core.guest.renderer_inner_bbox(ptr))?;
        Ok((bbox != 0).then_some(BBox {
            instance: self.instance,
            ptr: bbox,
        }))
    }

    /// Rasterize.
    pub fn render(&self) -> CardResult<RenderedImage<'i>> {
        let ptr = self.live_ptr()?;
        let image = self.instance.call(|core| {
            let (heap, views) = (&mut core.heap, &mut core.views);
            with_scratch(core.guest.as_mut(), |guest, retptr| {
                guest.renderer_render(&mut *heap, retptr, ptr)?;
                let [value, err, is_err] = read_slot::<3>(views, guest.memory(), retptr)?;
                take_result(heap, value, err, is_err)
            })
        })?;
        Ok(RenderedImage {
            instance: self.instance,
            ptr: image,
        })
    }

    /// Release the guest renderer. Idempotent.
    pub fn free(&mut self) -> CardResult<()> {
        let ptr = std::mem::take(&mut self.ptr);
        if ptr == 0 {
            return Ok(());
        }
        self.instance.call(|core| core.guest.renderer_free(ptr))
    }

    fn live_ptr(&self) -> CardResult<u32> {
        live(self.ptr, "renderer")
    }
}

impl Drop for Renderer<'_> {
    fn drop(&mut self) {
        // A poisoned instance is discarded together with its memory.
        if !self.instance.is_poisoned()
            && let Err(e) = self.free()
        {
            tracing::warn!(error = %e, "failed to release guest renderer");
        }
    }
}

/// A rasterized image living in the guest.
pub struct RenderedImage<'i> {
    instance: &'i Instance,
    ptr: u32,
}

impl RenderedImage<'_> {
    /// `true` once released.
    pub fn is_freed(&self) -> bool {
        self.ptr == 0
    }

    /// Pixel width.
    pub fn width(&self) -> CardResult<u32> {
        let ptr = live(self.ptr, "image")?;
        self.instance.call(|core| core.guest.image_width(ptr))
    }

    /// Pixel height.
    pub fn height(&self) -> CardResult<u32> {
        let ptr = live(self.ptr, "image")?;
        self.instance.call(|core| core.guest.image_height(ptr))
    }

    /// Encode as PNG and copy the bytes out of the guest.
    pub fn to_png(&self) -> CardResult<Vec<u8>> {
        let ptr = live(self.ptr, "image")?;
        self.instance.call(|core| {
            let (heap, views) = (&mut core.heap, &mut core.views);
            with_scratch(core.guest.as_mut(), |guest, retptr| {
                guest.image_as_png(&mut *heap, retptr, ptr)?;
                let [data, len, err, is_err] = read_slot::<4>(views, guest.memory(), retptr)?;
                if is_err != 0 {
                    let msg = heap.take_string(Handle::from_raw(err as u32))?;
                    return Err(CardError::guest(msg));
                }
                take_bytes(guest, views, data as u32, len as u32)
            })
        })
    }

    /// Release the guest image. Idempotent.
    pub fn free(&mut self) -> CardResult<()> {
        let ptr = std::mem::take(&mut self.ptr);
        if ptr == 0 {
            return Ok(());
        }
        self.instance.call(|core| core.guest.image_free(ptr))
    }
}

impl Drop for RenderedImage<'_> {
    fn drop(&mut self) {
        // A poisoned instance is discarded together with its memory.
        if !self.instance.is_poisoned()
            && let Err(e) = self.free()
        {
            tracing::warn!(error = %e, "failed to release guest image");
        }
    }
}

/// Content bounds living in the guest.
pub struct BBox<'i> {
    instance: &'i Instance,
    ptr: u32,
}

impl BBox<'_> {
    /// `true` once released.
    pub fn is_freed(&self) -> bool {
        self.ptr == 0
    }

    /// Read all four edges.
    pub fn bounds(&self) -> CardResult<Bounds> {
        let ptr = live(self.ptr, "bbox")?;
        self.instance.call(|core| {
            let g = &core.guest;
            Ok(Bounds {
                x: g.bbox_x(ptr)?,
                y: g.bbox_y(ptr)?,
                width: g.bbox_width(ptr)?,
                height: g.bbox_height(ptr)?,
            })
        })
    }

    /// Release the guest box. Idempotent.
    pub fn free(&mut self) -> CardResult<()> {
        let ptr = std::mem::take(&mut self.ptr);
        if ptr == 0 {
            return Ok(());
        }
        self.instance.call(|core| core.guest.bbox_free(ptr))
    }
}

impl Drop for BBox<'_> {
    fn drop(&mut self) {
        // A poisoned instance is discarded together with its memory.
        if !self.instance.is_poisoned()
            && let Err(e) = self.free()
        {
            tracing::warn!(error = %e, "failed to release guest bbox");
        }
    }
}

fn live(ptr: u32, what: &str) -> CardResult<u32> {
    if ptr == 0 {
        return Err(CardError::marshal(format!("{what} used after free")));
    }
    Ok(ptr)
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/instance.rs"]
mod tests;
