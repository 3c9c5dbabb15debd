use lru::LruCache;
use tracing::debug;

use crate::processor::cube::{BuildConfig, Cube, build_cube_with};
use crate::processor::definition::{AggregationSpec, DimensionSpec, MetricSpec};
use crate::processor::fact_table::FactTable;
use crate::processor::CubeError;
use std::cell::RefCell;

/// Identifies a cube by the table contents it was built from and its
/// definition.
///
/// Worker count is left out since it never changes the result.
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub struct CubeKey {
    table: u64,
    dimensions: DimensionSpec,
    metrics: MetricSpec,
    id_column: String,
    contribution_column: String,
    separator: char,
}

impl CubeKey {
    fn new(
        facts: &FactTable,
        dimensions: &DimensionSpec,
        metrics: &MetricSpec,
        config: &BuildConfig,
    ) -> Self {
        CubeKey {
            table: facts.generation(),
            dimensions: dimensions.clone(),
            metrics: metrics.clone(),
            id_column: config.id_column.clone(),
            contribution_column: config.contribution_column.clone(),
            separator: config.separator,
        }
    }
}

use std::num::NonZeroUsize;
use std::rc::Rc;

const CUBE_CACHE_CAPACITY: usize = 32;

#[derive(Debug)]
pub struct CubeCache {
    cache: RefCell<LruCache<CubeKey, Rc<Cube>>>,
}

impl CubeCache {
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(CUBE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            cache: RefCell::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &CubeKey) -> Option<Rc<Cube>> {
        self.cache.borrow_mut().get(key).cloned()
    }

    pub fn put(&self, key: CubeKey, cube: Rc<Cube>) {
        self.cache.borrow_mut().put(key, cube);
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CubeCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent cube definition over a shared fact table
#[derive(Debug, Clone)]
pub struct CubeBuilder {
    facts: Rc<FactTable>,
    cache: Option<Rc<CubeCache>>,
    dimensions: Vec<String>,
    metrics: MetricSpec,
    config: BuildConfig,
}

impl CubeBuilder {
    pub fn new(facts: Rc<FactTable>, cache: Option<Rc<CubeCache>>) -> Self {
        Self {
            facts,
            cache,
            dimensions: Vec::new(),
            metrics: MetricSpec::new(),
            config: BuildConfig::default(),
        }
    }

    /// Add a single grouping column
    pub fn dimension(mut self, column: &str) -> Self {
        self.dimensions.push(column.to_string());
        self
    }

    /// Add several grouping columns, in order
    pub fn dimensions(mut self, columns: Vec<&str>) -> Self {
        for col in columns {
            self.dimensions.push(col.to_string());
        }
        self
    }

    /// Apply one function to a metric column
    pub fn metric(mut self, column: &str, function: &str) -> Self {
        self.metrics.insert(column, function);
        self
    }

    /// Apply a list of functions to a metric column
    pub fn metrics(mut self, column: &str, functions: Vec<&str>) -> Self {
        self.metrics.insert(column, AggregationSpec::from(functions));
        self
    }

    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Disable caching
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Validates the definition and builds (or fetches) the cube
    pub fn build(self) -> Result<Rc<Cube>, CubeError> {
        let dimensions = DimensionSpec::new(self.dimensions)?;

        let Some(cache) = &self.cache else {
            return Ok(Rc::new(build_cube_with(
                &self.facts,
                &dimensions,
                &self.metrics,
                &self.config,
            )?));
        };

        let key = CubeKey::new(&self.facts, &dimensions, &self.metrics, &self.config);
        if let Some(cube) = cache.get(&key) {
            debug!("Cube cache hit for {:?}", dimensions.names());
            return Ok(cube);
        }

        let cube = Rc::new(build_cube_with(
            &self.facts,
            &dimensions,
            &self.metrics,
            &self.config,
        )?);
        cache.put(key, Rc::clone(&cube));
        Ok(cube)
    }
}

impl FactTable {
    pub fn cube(self: &Rc<Self>) -> CubeBuilder {
        CubeBuilder::new(self.clone(), None)
    }

    pub fn cube_with_cache(self: &Rc<Self>, cache: &Rc<CubeCache>) -> CubeBuilder {
        CubeBuilder::new(self.clone(), Some(cache.clone()))
    }
}
