use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, trace};

use crate::config::{FileLoader, ScannerConfig};

/// A successfully resolved include
#[derive(Clone)]
pub(crate) struct ResolvedInclude {
    /// Resolved path; the file's identity from here on
    pub path: Rc<str>,
    /// File content, shared with the cache
    pub text: Rc<[char]>,
    /// Search-list entry that produced the file; `None` for absolute paths
    /// and current-directory hits
    pub path_index: Option<usize>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    paths_id: u64,
    name: String,
    system: bool,
}

struct CacheEntry {
    resolved: ResolvedInclude,
    cost: usize,
    stamp: u64,
}

/// Bounded memoization of include resolutions
///
/// Keyed by (identity of the searched path list, spelled name, form), so
/// scans sharing the same include paths skip repeated filesystem probing.
/// Eviction is least-recently-used under a byte budget.
pub struct IncludeCache {
    entries: HashMap<CacheKey, CacheEntry>,
    budget: usize,
    used: usize,
    tick: u64,
}

impl Default for IncludeCache {
    fn default() -> Self {
        // 64 MiB, roomy enough for a large header set
        Self::new(64 * 1024 * 1024)
    }
}

impl IncludeCache {
    /// Create a cache bounded to roughly `budget_bytes` of file content
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        IncludeCache {
            entries: HashMap::new(),
            budget: budget_bytes,
            used: 0,
            tick: 0,
        }
    }

    /// Number of cached resolutions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all cached resolutions
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    fn get(&mut self, key: &CacheKey) -> Option<ResolvedInclude> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.stamp = tick;
        trace!("include cache hit: {}", key.name);
        Some(entry.resolved.clone())
    }

    fn put(&mut self, key: CacheKey, resolved: ResolvedInclude) {
        let cost = resolved.text.len() * std::mem::size_of::<char>();
        if cost > self.budget {
            return;
        }
        self.tick += 1;
        if let Some(old) = self.entries.insert(
            key,
            CacheEntry {
                resolved,
                cost,
                stamp: self.tick,
            },
        ) {
            self.used -= old.cost;
        }
        self.used += cost;
        while self.used > self.budget {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used -= evicted.cost;
                debug!("include cache evict: {}", oldest.name);
            }
        }
    }
}

/// Include-path search state for one scanner
pub(crate) struct IncludeSearch {
    quote_paths: Vec<PathBuf>,
    system_paths: Vec<PathBuf>,
    loader: FileLoader,
    cache: Option<Rc<RefCell<IncludeCache>>>,
    quote_id: u64,
    system_id: u64,
}

fn paths_identity(paths: &[&[PathBuf]]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for list in paths {
        for p in *list {
            p.hash(&mut hasher);
        }
    }
    hasher.finish()
}

impl IncludeSearch {
    pub(crate) fn new(config: &ScannerConfig) -> Self {
        let loader: FileLoader = match &config.file_loader {
            Some(loader) => loader.clone(),
            None => Rc::new(|path: &Path| std::fs::read_to_string(path).ok()),
        };
        IncludeSearch {
            quote_id: paths_identity(&[&config.quote_include_paths, &config.system_include_paths]),
            system_id: paths_identity(&[&config.system_include_paths]),
            quote_paths: config.quote_include_paths.clone(),
            system_paths: config.system_include_paths.clone(),
            loader,
            cache: config.include_cache.clone(),
        }
    }

    fn load(&self, candidate: &Path, path_index: Option<usize>) -> Option<ResolvedInclude> {
        let text = (self.loader)(candidate)?;
        let chars: Vec<char> = text.chars().collect();
        Some(ResolvedInclude {
            path: Rc::from(candidate.to_string_lossy().into_owned()),
            text: Rc::from(chars),
            path_index,
        })
    }

    /// Load a file by its literal path, without consulting the search lists
    /// or the cache. Used for pre-included files.
    pub(crate) fn load_direct(&self, path: &Path) -> Option<ResolvedInclude> {
        self.load(path, None)
    }

    /// Resolve an include directive to file content
    ///
    /// `resume_after` is the search-list index that produced the currently
    /// open file; `#include_next` starts past it and bypasses the cache.
    pub(crate) fn resolve(
        &self,
        name: &str,
        system: bool,
        include_next: bool,
        current_dir: Option<&Path>,
        resume_after: Option<usize>,
    ) -> Option<ResolvedInclude> {
        let spelled = Path::new(name);
        if spelled.is_absolute() || name.starts_with('/') {
            return self.load(spelled, None);
        }

        if !system && !include_next {
            if let Some(dir) = current_dir {
                if let Some(found) = self.load(&dir.join(name), None) {
                    trace!("include \"{name}\" found next to including file");
                    return Some(found);
                }
            }
        }

        let key = CacheKey {
            paths_id: if system { self.system_id } else { self.quote_id },
            name: name.to_string(),
            system,
        };
        if !include_next {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache.borrow_mut().get(&key) {
                    return Some(hit);
                }
            }
        }

        let search_list: Vec<&PathBuf> = if system {
            self.system_paths.iter().collect()
        } else {
            self.quote_paths.iter().chain(self.system_paths.iter()).collect()
        };
        let start = if include_next {
            resume_after.map_or(0, |i| i + 1)
        } else {
            0
        };

        for (index, dir) in search_list.iter().enumerate().skip(start) {
            if let Some(found) = self.load(&dir.join(name), Some(index)) {
                debug!("include {name:?} resolved via path entry {index}");
                if !include_next {
                    if let Some(cache) = &self.cache {
                        cache.borrow_mut().put(key, found.clone());
                    }
                }
                return Some(found);
            }
        }
        debug!("include {name:?} not found");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_loader(files: Vec<(&str, &str)>) -> FileLoader {
        let map: HashMap<String, String> = files
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Rc::new(move |path: &Path| map.get(&path.to_string_lossy().replace('\\', "/")).cloned())
    }

    fn search(config: ScannerConfig) -> IncludeSearch {
        IncludeSearch::new(&config)
    }

    #[test]
    fn quote_form_prefers_current_directory() {
        let config = ScannerConfig::for_c()
            .with_include_path("inc")
            .with_file_loader({
                let loader = virtual_loader(vec![
                    ("src/a.h", "current"),
                    ("inc/a.h", "list"),
                ]);
                move |p| loader(p)
            });
        let s = search(config);
        let hit = s
            .resolve("a.h", false, false, Some(Path::new("src")), None)
            .unwrap();
        assert_eq!(&*hit.path, "src/a.h");
        assert_eq!(hit.path_index, None);

        // angle form ignores the current directory
        let hit = s
            .resolve("a.h", true, false, Some(Path::new("src")), None)
            .unwrap();
        assert_eq!(&*hit.path, "inc/a.h");
        assert_eq!(hit.path_index, Some(0));
    }

    #[test]
    fn include_next_resumes_after_producing_entry() {
        let config = ScannerConfig::for_c()
            .with_include_path("first")
            .with_include_path("second")
            .with_file_loader({
                let loader = virtual_loader(vec![
                    ("first/x.h", "one"),
                    ("second/x.h", "two"),
                ]);
                move |p| loader(p)
            });
        let s = search(config);
        let first = s.resolve("x.h", true, false, None, None).unwrap();
        assert_eq!(&*first.path, "first/x.h");
        let next = s
            .resolve("x.h", true, true, None, first.path_index)
            .unwrap();
        assert_eq!(&*next.path, "second/x.h");
        // nothing after the last entry
        assert!(s.resolve("x.h", true, true, None, next.path_index).is_none());
    }

    #[test]
    fn cache_is_consulted_and_bounded() {
        let cache = Rc::new(RefCell::new(IncludeCache::new(64)));
        let config = ScannerConfig::for_c()
            .with_system_include_path("inc")
            .with_include_cache(cache.clone())
            .with_file_loader({
                let loader = virtual_loader(vec![
                    ("inc/small.h", "abc"),
                    ("inc/other.h", "xyz"),
                ]);
                move |p| loader(p)
            });
        let s = search(config);
        assert!(s.resolve("small.h", true, false, None, None).is_some());
        assert_eq!(cache.borrow().len(), 1);
        // second resolution is served from the cache
        assert!(s.resolve("small.h", true, false, None, None).is_some());
        assert_eq!(cache.borrow().len(), 1);

        // 64-byte budget holds at most two 3-char files (12 bytes each),
        // but a tiny budget evicts the least recently used
        let tiny = Rc::new(RefCell::new(IncludeCache::new(12)));
        let config = ScannerConfig::for_c()
            .with_system_include_path("inc")
            .with_include_cache(tiny.clone())
            .with_file_loader({
                let loader = virtual_loader(vec![
                    ("inc/small.h", "abc"),
                    ("inc/other.h", "xyz"),
                ]);
                move |p| loader(p)
            });
        let s = search(config);
        assert!(s.resolve("small.h", true, false, None, None).is_some());
        assert!(s.resolve("other.h", true, false, None, None).is_some());
        assert_eq!(tiny.borrow().len(), 1);
    }

    #[test]
    fn missing_file_is_none() {
        let config = ScannerConfig::for_c().with_file_loader(|_: &Path| None);
        assert!(search(config).resolve("gone.h", false, false, None, None).is_none());
    }
}
