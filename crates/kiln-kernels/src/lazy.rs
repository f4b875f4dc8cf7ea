//! Architecture-scoped, on-demand code-object loading.
//!
//! Code objects live in one directory, one file per kernel
//! (`<kernel>.co`) plus a shared fallback per architecture
//! (`Kernels.so-000-<arch>.hsaco`). Nothing is loaded when lazy loading is
//! armed; a file is read the first time a kernel it may contain is
//! requested and missed in the cache.

use std::path::{Component, Path, PathBuf};

use crate::error::KernelError;
use crate::Result;

/// Lazy-loading configuration: target architecture and code-object directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LazyLoading {
    architecture: String,
    directory: PathBuf,
}

impl LazyLoading {
    /// Validate that `directory` exists. Individual files are only checked
    /// on demand.
    pub fn new(architecture: impl Into<String>, directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(KernelError::MissingCodeObjectDirectory(directory));
        }
        Ok(Self {
            architecture: architecture.into(),
            directory,
        })
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Identifier of the per-kernel code-object file.
    pub fn kernel_file(kernel_name: &str) -> String {
        format!("{kernel_name}.co")
    }

    /// Identifier of the architecture's shared fallback file.
    pub fn fallback_file(&self) -> String {
        format!("Kernels.so-000-{}.hsaco", self.architecture)
    }

    /// Candidate file identifiers for `kernel_name`, most specific first.
    pub fn candidates(&self, kernel_name: &str) -> [String; 2] {
        [Self::kernel_file(kernel_name), self.fallback_file()]
    }

    pub fn path_of(&self, file_id: &str) -> PathBuf {
        self.directory.join(file_id)
    }

    /// The first candidate for `kernel_name` that exists on disk.
    ///
    /// Only plain file names are considered, so a kernel name with a path
    /// separator, `..` or a root never reaches outside the directory.
    pub fn locate(&self, kernel_name: &str) -> Option<(String, PathBuf)> {
        self.candidates(kernel_name)
            .into_iter()
            .filter(|id| is_file_name(id))
            .find_map(|id| {
                let path = self.path_of(&id);
                path.is_file().then_some((id, path))
            })
    }
}

/// Whether `id` is exactly one normal path component.
fn is_file_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory() {
        let err = LazyLoading::new("gfx90a", "/definitely/not/here").unwrap_err();
        assert!(matches!(err, KernelError::MissingCodeObjectDirectory(_)));
    }

    #[test]
    fn test_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyLoading::new("gfx942", dir.path()).unwrap();
        assert_eq!(
            lazy.candidates("Cijk_Ailk_Bljk_SB"),
            ["Cijk_Ailk_Bljk_SB.co".to_string(), "Kernels.so-000-gfx942.hsaco".to_string()]
        );
        assert_eq!(lazy.path_of("x.co"), dir.path().join("x.co"));
    }

    #[test]
    fn test_locate_prefers_kernel_file() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyLoading::new("gfx90a", dir.path()).unwrap();
        assert_eq!(lazy.locate("k"), None);

        std::fs::write(dir.path().join("Kernels.so-000-gfx90a.hsaco"), b"k").unwrap();
        assert_eq!(lazy.locate("k").unwrap().0, "Kernels.so-000-gfx90a.hsaco");

        std::fs::write(dir.path().join("k.co"), b"k").unwrap();
        assert_eq!(lazy.locate("k").unwrap().0, "k.co");
    }

    #[test]
    fn test_locate_stays_inside_directory() {
        let root = tempfile::tempdir().unwrap();
        let kernels = root.path().join("kernels");
        std::fs::create_dir(&kernels).unwrap();
        std::fs::create_dir(kernels.join("sub")).unwrap();
        std::fs::write(root.path().join("outside.co"), b"outside").unwrap();
        std::fs::write(kernels.join("sub").join("nested.co"), b"nested").unwrap();

        let lazy = LazyLoading::new("gfx90a", &kernels).unwrap();
        assert_eq!(lazy.locate("../outside"), None);
        assert_eq!(lazy.locate("sub/nested"), None);

        let absolute = root.path().join("outside");
        assert_eq!(lazy.locate(absolute.to_str().unwrap()), None);
    }

    #[test]
    fn test_traversing_name_still_gets_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Kernels.so-000-gfx90a.hsaco"), b"k").unwrap();
        let lazy = LazyLoading::new("gfx90a", dir.path()).unwrap();
        assert_eq!(
            lazy.locate("../k").unwrap().0,
            "Kernels.so-000-gfx90a.hsaco"
        );
    }

    #[test]
    fn test_traversing_architecture_rejected() {
        let root = tempfile::tempdir().unwrap();
        let kernels = root.path().join("kernels");
        std::fs::create_dir(&kernels).unwrap();
        std::fs::write(root.path().join("Kernels.so-000-x.hsaco"), b"k").unwrap();

        let lazy = LazyLoading::new("x/../../Kernels.so-000-x", &kernels).unwrap();
        assert_eq!(lazy.locate("k"), None);
    }

    #[test]
    fn test_is_file_name() {
        assert!(is_file_name("k.co"));
        assert!(!is_file_name("../k.co"));
        assert!(!is_file_name("a/k.co"));
        assert!(!is_file_name("/k.co"));
        assert!(!is_file_name(""));
        assert!(!is_file_name(".."));
    }
}
