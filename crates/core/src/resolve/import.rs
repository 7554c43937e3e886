//! `!import` directives.
//!
//! A scalar carrying the import tag is replaced by the content of another
//! document, read through the resource provider in scope and parsed as a
//! standalone single document of whatever type the caller expects. Relative
//! paths are resolved against the document on top of the file stack, so a
//! nested import is relative to the file that contains it.

use std::{
    path::{Component, Path, PathBuf},
    rc::Rc,
};

use tracing::debug;

use crate::{
    document::{Document, Event, EventKind, Span},
    error::LoadError,
    materialize::{Materialize, Materializer},
    resource::{DirectoryProvider, ResourceProvider},
};

/// Target and span of an import directive, if `next` is one.
pub fn directive(next: Option<&Event>, import_tag: &str) -> Option<(String, Span)> {
    let event = next?;
    match &event.kind {
        EventKind::Scalar {
            value,
            tag: Some(tag),
            ..
        } if tag.is_local(import_tag) => Some((value.clone(), event.span)),
        _ => None,
    }
}

/// Materialize `T` from the document named by an import directive.
pub fn substitute<T: Materialize>(
    cx: &mut Materializer<'_>,
    target: &str,
    span: Span,
) -> Result<T, LoadError> {
    let provider: Rc<dyn ResourceProvider> = match cx.provider() {
        Some(provider) => provider,
        None => Rc::new(DirectoryProvider::working_dir()),
    };
    let importer = cx.current_file().map(Path::to_path_buf);
    let base = importer
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    let path = provider.resolve(&normalize(&base.join(target)));

    let result = load_import::<T>(cx, provider.as_ref(), path, span);
    match (result, importer) {
        (Err(err @ LoadError::InFile { .. }), Some(importer)) => Err(LoadError::InFile {
            path: importer,
            span: Some(span),
            source: Box::new(err),
        }),
        (result, _) => result,
    }
}

fn load_import<T: Materialize>(
    cx: &mut Materializer<'_>,
    provider: &dyn ResourceProvider,
    path: PathBuf,
    span: Span,
) -> Result<T, LoadError> {
    if !provider.exists(&path) {
        return Err(LoadError::ImportNotFound { path, span });
    }
    if cx.is_open_file(&path) {
        return Err(LoadError::ImportCycle { path, span });
    }

    let text = provider.read_text(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let document = Document::parse(&path, &text).map_err(|err| err.in_file(&path))?;
    debug!(path = %path.display(), provider = provider.name(), "importing document");

    cx.with_file(path.clone(), |cx| {
        cx.read::<T>(&mut document.cursor())
            .map_err(|err| err.in_file(&path))
    })
}

/// Lexically normalize `path`, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) && normalized.pop();
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registry::TypeRegistry,
        resource::MemoryProvider,
        testing::Harness,
    };
    use std::{collections::BTreeMap, fs};
    use tempfile::tempdir;

    #[test]
    fn normalize_folds_dots() {
        assert_eq!(normalize(Path::new("/a/b/./../c.yaml")), PathBuf::from("/a/c.yaml"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn missing_import_reports_absolute_path() -> anyhow::Result<()> {
        let temp = tempdir()?;
        let root = temp.path().join("mod.yaml");
        let document = Document::parse(&root, "items: !import data/missing.yaml\n")?;

        let err = Harness::new(TypeRegistry::new())
            .with_directory(temp.path())
            .read::<BTreeMap<String, Vec<String>>>(&document)
            .unwrap_err();
        match err.root_cause() {
            LoadError::ImportNotFound { path, span } => {
                assert!(path.is_absolute());
                assert_eq!(path, &temp.path().join("data").join("missing.yaml"));
                assert_eq!(span.start.line, 1);
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn nested_imports_resolve_against_their_own_file() -> anyhow::Result<()> {
        let temp = tempdir()?;
        fs::create_dir_all(temp.path().join("data").join("deep"))?;
        fs::write(
            temp.path().join("data").join("list.yaml"),
            "- first\n- !import deep/value.yaml\n",
        )?;
        fs::write(temp.path().join("data").join("deep").join("value.yaml"), "second\n")?;
        // A file with the same name next to the root must not be picked up.
        fs::create_dir_all(temp.path().join("deep"))?;
        fs::write(temp.path().join("deep").join("value.yaml"), "wrong\n")?;

        let root = temp.path().join("mod.yaml");
        let document = Document::parse(&root, "!import data/list.yaml")?;
        let values: Vec<String> = Harness::new(TypeRegistry::new())
            .with_directory(temp.path())
            .read(&document)?;
        assert_eq!(values, vec!["first", "second"]);
        Ok(())
    }

    #[test]
    fn cycles_are_detected() -> anyhow::Result<()> {
        let provider = MemoryProvider::new("/pack")
            .with_file("a.yaml", "!import b.yaml")
            .with_file("b.yaml", "!import a.yaml");
        let document = Document::parse("/pack/a.yaml", "!import b.yaml")?;

        let err = Harness::new(TypeRegistry::new())
            .with_provider(provider)
            .read::<String>(&document)
            .unwrap_err();
        assert!(matches!(err.root_cause(), LoadError::ImportCycle { .. }));
        Ok(())
    }

    #[test]
    fn errors_inside_imports_name_both_files() -> anyhow::Result<()> {
        let provider = MemoryProvider::new("/pack").with_file("bad.yaml", "[1, 2]");
        let document = Document::parse("/pack/root.yaml", "value: !import bad.yaml\n")?;

        let err = Harness::new(TypeRegistry::new())
            .with_provider(provider)
            .read::<BTreeMap<String, String>>(&document)
            .unwrap_err();
        assert_eq!(
            err.file_trail(),
            vec![Path::new("/pack/root.yaml"), Path::new("/pack/bad.yaml")]
        );
        assert!(matches!(err.root_cause(), LoadError::UnexpectedNode { .. }));
        Ok(())
    }
}
