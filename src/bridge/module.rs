use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::bridge::guest::ResvgGuest;
use crate::bridge::instance::{Instance, RenderedPng};
use crate::bridge::memory::DEFAULT_MAX_PAGES;
use crate::bridge::options::RenderOptions;
use crate::foundation::error::{CardError, CardResult};

/// Instances kept warm by default.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Pages each instance starts with: the shadow stack plus one heap page.
pub const DEFAULT_INITIAL_PAGES: u32 = 2;

/// Everything needed to compile the rasterizer module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleSource {
    /// Load the host's installed fonts.
    pub load_system_fonts: bool,
    /// Extra font files (`.ttf`, `.otf`, `.ttc`).
    pub font_files: Vec<PathBuf>,
    /// Directories scanned (non-recursively) for font files.
    pub font_dirs: Vec<PathBuf>,
    /// Family used when a document asks for one that is not installed.
    pub default_family: Option<String>,
    /// Pages each instance starts with.
    pub initial_pages: u32,
    /// Page limit per instance; allocations past it trap.
    pub max_pages: u32,
    /// Idle instances retained between renders.
    pub pool_size: usize,
}

impl Default for ModuleSource {
    fn default() -> Self {
        Self {
            load_system_fonts: true,
            font_files: Vec::new(),
            font_dirs: Vec::new(),
            default_family: None,
            initial_pages: DEFAULT_INITIAL_PAGES,
            max_pages: DEFAULT_MAX_PAGES,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// A compiled rasterizer: shared, immutable state every instance starts from.
#[derive(Debug)]
pub struct RasterModule {
    fonts: Arc<usvg::fontdb::Database>,
    default_family: Option<String>,
    initial_pages: u32,
    max_pages: u32,
    pool_size: usize,
}

impl RasterModule {
    /// Load fonts and validate memory limits.
    #[tracing::instrument(skip_all, fields(system_fonts = source.load_system_fonts))]
    pub fn compile(source: &ModuleSource) -> CardResult<Self> {
        if source.initial_pages == 0 || source.initial_pages > source.max_pages {
            return Err(CardError::validation(format!(
                "initial_pages must be within 1..={}, got {}",
                source.max_pages, source.initial_pages
            )));
        }

        let mut db = usvg::fontdb::Database::new();
        if source.load_system_fonts {
            db.load_system_fonts();
        }
        for dir in &source.font_dirs {
            load_fonts_from_dir(&mut db, dir);
        }
        for file in &source.font_files {
            db.load_font_file(file).map_err(|e| {
                CardError::validation(format!("load font '{}': {e}", file.display()))
            })?;
        }
        if let Some(family) = &source.default_family {
            db.set_sans_serif_family(family.clone());
        }
        tracing::info!(faces = db.faces().count(), "rasterizer module compiled");

        Ok(Self {
            fonts: Arc::new(db),
            default_family: source.default_family.clone(),
            initial_pages: source.initial_pages,
            max_pages: source.max_pages,
            pool_size: source.pool_size,
        })
    }

    /// Shared font database.
    pub fn fonts(&self) -> Arc<usvg::fontdb::Database> {
        Arc::clone(&self.fonts)
    }

    /// Configured fallback family.
    pub fn default_family(&self) -> Option<&str> {
        self.default_family.as_deref()
    }

    /// Initial pages per instance.
    pub fn initial_pages(&self) -> u32 {
        self.initial_pages
    }

    /// Page limit per instance.
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Idle instances retained by a [`RenderBridge`].
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Create a fresh instance with its own memory and heap table.
    pub fn instantiate(self: &Arc<Self>) -> CardResult<Instance> {
        let guest = ResvgGuest::new(Arc::clone(self))?;
        Ok(Instance::new(Box::new(guest)))
    }
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &std::path::Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "font directory not readable");
        return;
    };
    for entry in rd.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        if matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc") {
            let _ = db.load_font_file(&path);
        }
    }
}

/// Pool counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances created.
    pub created: u64,
    /// Checkouts served from the pool.
    pub reused: u64,
    /// Instances dropped because they were poisoned or the pool was full.
    pub discarded: u64,
    /// Idle instances right now.
    pub idle: usize,
}

#[derive(Default)]
struct Pool {
    idle: Vec<Instance>,
    stats: PoolStats,
}

/// Process-level owner of the rasterizer module and a bounded pool of instances.
///
/// The module is compiled exactly once. Each render checks an instance out, so concurrent renders
/// never share guest memory; the mutex guards only the pool itself.
pub struct RenderBridge {
    module: OnceLock<Arc<RasterModule>>,
    pool: Mutex<Pool>,
}

impl Default for RenderBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBridge {
    /// Uninitialized bridge.
    pub const fn new() -> Self {
        Self {
            module: OnceLock::new(),
            pool: Mutex::new(Pool {
                idle: Vec::new(),
                stats: PoolStats {
                    created: 0,
                    reused: 0,
                    discarded: 0,
                    idle: 0,
                },
            }),
        }
    }

    /// The process-wide bridge.
    pub fn global() -> &'static RenderBridge {
        static GLOBAL: RenderBridge = RenderBridge::new();
        &GLOBAL
    }

    /// Compile the module. Fails with [`CardError::AlreadyInitialized`] on a second call.
    pub fn init(&self, source: &ModuleSource) -> CardResult<()> {
        if self.is_initialized() {
            return Err(CardError::AlreadyInitialized);
        }
        self.install(RasterModule::compile(source)?)
    }

    /// [`RenderBridge::init`] with font loading moved off the async runtime.
    pub async fn init_async(&self, source: ModuleSource) -> CardResult<()> {
        if self.is_initialized() {
            return Err(CardError::AlreadyInitialized);
        }
        let module = tokio::task::spawn_blocking(move || RasterModule::compile(&source))
            .await
            .map_err(|e| anyhow::anyhow!("module compile task failed: {e}"))??;
        self.install(module)
    }

    /// `true` once a module is installed.
    pub fn is_initialized(&self) -> bool {
        self.module.get().is_some()
    }

    /// The compiled module.
    pub fn module(&self) -> CardResult<&Arc<RasterModule>> {
        self.module.get().ok_or(CardError::NotInitialized)
    }

    /// Take an instance from the pool, instantiating one if none is idle.
    pub fn checkout(&self) -> CardResult<PooledInstance<'_>> {
        let module = self.module()?;
        let reused = {
            let mut pool = self.lock_pool();
            let instance = pool.idle.pop();
            if instance.is_some() {
                pool.stats.reused += 1;
            }
            instance
        };
        let instance = match reused {
            Some(instance) => instance,
            None => {
                let instance = module.instantiate()?;
                self.lock_pool().stats.created += 1;
                tracing::debug!("instantiated rasterizer");
                instance
            }
        };
        Ok(PooledInstance {
            bridge: self,
            instance: Some(instance),
        })
    }

    /// Render `svg` on a pooled instance.
    pub fn render(&self, svg: &str, opts: &RenderOptions) -> CardResult<RenderedPng> {
        self.checkout()?.render(svg, opts)
    }

    /// Render SVG bytes on a pooled instance.
    pub fn render_bytes(&self, svg: Vec<u8>, opts: &RenderOptions) -> CardResult<RenderedPng> {
        self.checkout()?.render_bytes(svg, opts)
    }

    /// Pool counters.
    pub fn stats(&self) -> PoolStats {
        let pool = self.lock_pool();
        PoolStats {
            idle: pool.idle.len(),
            ..pool.stats.clone()
        }
    }

    fn install(&self, module: RasterModule) -> CardResult<()> {
        self.module
            .set(Arc::new(module))
            .map_err(|_| CardError::AlreadyInitialized)
    }

    fn check_in(&self, instance: Instance) {
        let limit = self.module.get().map_or(0, |m| m.pool_size());
        let mut pool = self.lock_pool();
        if instance.is_poisoned() || pool.idle.len() >= limit {
            pool.stats.discarded += 1;
            tracing::debug!(poisoned = instance.is_poisoned(), "discarded rasterizer instance");
            return;
        }
        pool.idle.push(instance);
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An instance checked out of a [`RenderBridge`]; returned to the pool on drop.
pub struct PooledInstance<'b> {
    bridge: &'b RenderBridge,
    instance: Option<Instance>,
}

impl std::ops::Deref for PooledInstance<'_> {
    type Target = Instance;

    fn deref(&self) -> &Instance {
        // Only `Drop` takes the instance out.
        match &self.instance {
            Some(instance) => instance,
            None => unreachable!("pooled instance used after check-in"),
        }
    }
}

impl Drop for PooledInstance<'_> {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.bridge.check_in(instance);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bridge/module.rs"]
mod tests;
