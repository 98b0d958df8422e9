use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use super::*;
use crate::lookup::MemoryFileLookup;

struct Fixture {
    fs: Arc<MemoryFileLookup>,
    options: ResolverOptions,
}

impl Fixture {
    fn new() -> Self {
        Self {
            fs: Arc::new(MemoryFileLookup::new()),
            options: ResolverOptions::default(),
        }
    }

    fn file(self, path: &str) -> Self {
        self.fs.add_file(path, "");
        self
    }

    fn file_with(self, path: &str, contents: &str) -> Self {
        self.fs.add_file(path, contents);
        self
    }

    fn options(mut self, f: impl FnOnce(&mut ResolverOptions)) -> Self {
        f(&mut self.options);
        self
    }

    fn build(self) -> Resolver {
        let lookup: Arc<dyn crate::FileSystemLookup> = self.fs;
        Resolver::new(PathBuf::from("/p"), self.options, lookup)
    }
}

fn source(path: &str) -> Resolution {
    Resolution::SourceFile(PathBuf::from(path))
}

#[test]
fn resolves_exact_relative_file() {
    let resolver = Fixture::new().file("/p/src/utils.js").build();
    let result = resolver
        .resolve(Path::new("/p/src/app.js"), "./utils.js", None)
        .unwrap();
    assert_eq!(result, source("/p/src/utils.js"));
}

#[test]
fn probes_source_extensions_in_order() {
    let resolver = Fixture::new()
        .file("/p/src/utils.ts")
        .file("/p/src/other.json")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./utils", None)
            .unwrap(),
        source("/p/src/utils.ts")
    );
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./other", None)
            .unwrap(),
        source("/p/src/other.json")
    );
}

#[test]
fn earlier_extension_wins() {
    let resolver = Fixture::new()
        .file("/p/src/utils.js")
        .file("/p/src/utils.ts")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./utils", None)
            .unwrap(),
        source("/p/src/utils.js")
    );
}

#[test]
fn platform_specific_file_wins_over_plain() {
    let resolver = Fixture::new()
        .file("/p/src/button.js")
        .file("/p/src/button.android.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./button", Some("android"))
            .unwrap(),
        source("/p/src/button.android.js")
    );
}

#[test]
fn native_sits_between_platform_and_plain() {
    let resolver = Fixture::new()
        .file("/p/src/button.js")
        .file("/p/src/button.native.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./button", Some("android"))
            .unwrap(),
        source("/p/src/button.native.js")
    );

    let with_platform = Fixture::new()
        .file("/p/src/button.native.js")
        .file("/p/src/button.ios.js")
        .build();
    assert_eq!(
        with_platform
            .resolve(Path::new("/p/src/app.js"), "./button", Some("ios"))
            .unwrap(),
        source("/p/src/button.ios.js")
    );
}

#[test]
fn directory_falls_back_to_index() {
    let resolver = Fixture::new().file("/p/src/widgets/index.tsx").build();
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./widgets", None)
            .unwrap(),
        source("/p/src/widgets/index.tsx")
    );
}

#[test]
fn absolute_specifiers_resolve_from_root() {
    let resolver = Fixture::new().file("/p/src/shared.js").build();
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "/p/src/shared", None)
            .unwrap(),
        source("/p/src/shared.js")
    );
}

#[test]
fn bare_specifier_walks_node_modules_ancestors() {
    let resolver = Fixture::new()
        .file_with(
            "/p/node_modules/react/package.json",
            r#"{"name": "react", "main": "index.js"}"#,
        )
        .file("/p/node_modules/react/index.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/deep/app.js"), "react", None)
            .unwrap(),
        source("/p/node_modules/react/index.js")
    );
}

#[test]
fn nearest_node_modules_wins() {
    let resolver = Fixture::new()
        .file("/p/node_modules/dep/index.js")
        .file("/p/src/node_modules/dep/index.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "dep", None)
            .unwrap(),
        source("/p/src/node_modules/dep/index.js")
    );
}

#[test]
fn scoped_package_with_subpath() {
    let resolver = Fixture::new()
        .file("/p/node_modules/@scope/pkg/lib/util.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "@scope/pkg/lib/util", None)
            .unwrap(),
        source("/p/node_modules/@scope/pkg/lib/util.js")
    );
}

#[test]
fn main_fields_are_consulted_in_order() {
    let resolver = Fixture::new()
        .file_with(
            "/p/node_modules/lib/package.json",
            r#"{"main": "./cjs/index.js", "react-native": "./rn/index.js"}"#,
        )
        .file("/p/node_modules/lib/cjs/index.js")
        .file("/p/node_modules/lib/rn/index.js")
        .build();

    // Default field order puts react-native first.
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "lib", None)
            .unwrap(),
        source("/p/node_modules/lib/rn/index.js")
    );
}

#[test]
fn browser_map_stubs_out_node_builtins() {
    let resolver = Fixture::new()
        .file_with("/p/package.json", r#"{"browser": {"fs": false}}"#)
        .file("/p/src/app.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "fs", None)
            .unwrap(),
        Resolution::Empty
    );
}

#[test]
fn browser_map_redirects_specifiers() {
    let resolver = Fixture::new()
        .file_with(
            "/p/package.json",
            r#"{"browser": {"./io.js": "./io-web.js"}}"#,
        )
        .file("/p/io-web.js")
        .file("/p/io.js")
        .file("/p/app.js")
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/app.js"), "./io.js", None)
            .unwrap(),
        source("/p/io-web.js")
    );
}

#[test]
fn extra_node_modules_is_the_last_fallback() {
    let resolver = Fixture::new()
        .file("/vendored/polyfills/index.js")
        .options(|options| {
            options
                .extra_node_modules
                .insert("polyfills".into(), PathBuf::from("/vendored/polyfills"));
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "polyfills", None)
            .unwrap(),
        source("/vendored/polyfills/index.js")
    );
}

#[test]
fn hierarchical_lookup_can_be_disabled() {
    let resolver = Fixture::new()
        .file("/p/node_modules/dep/index.js")
        .file("/search/dep/index.js")
        .options(|options| {
            options.disable_hierarchical_lookup = true;
            options.node_modules_paths = vec![PathBuf::from("/search")];
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "dep", None)
            .unwrap(),
        source("/search/dep/index.js")
    );
}

#[test]
fn block_list_hides_candidates() {
    let resolver = Fixture::new()
        .file("/p/src/secret.js")
        .options(|options| {
            options.block_list = Some(Regex::new(r"secret").unwrap());
        })
        .build();

    assert!(resolver
        .resolve(Path::new("/p/src/app.js"), "./secret", None)
        .is_err());
}

#[test]
fn assets_collect_all_density_variants() {
    let resolver = Fixture::new()
        .file("/p/assets/logo.png")
        .file("/p/assets/logo@2x.png")
        .file("/p/assets/logo@3x.png")
        .build();

    let result = resolver
        .resolve(Path::new("/p/src/app.js"), "../assets/logo.png", None)
        .unwrap();

    assert_eq!(
        result,
        Resolution::AssetFiles(vec![
            PathBuf::from("/p/assets/logo.png"),
            PathBuf::from("/p/assets/logo@2x.png"),
            PathBuf::from("/p/assets/logo@3x.png"),
        ])
    );
}

#[test]
fn empty_module_sentinel_resolves_empty() {
    let resolver = Fixture::new()
        .options(|options| {
            options.empty_module_specifier = Some("ferry/empty".into());
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "ferry/empty", None)
            .unwrap(),
        Resolution::Empty
    );
}

#[test]
fn failed_path_error_names_file_and_dir_candidates() {
    let resolver = Fixture::new().file("/p/src/foo.js").build();

    let err = resolver
        .resolve(Path::new("/p/src/foo.js"), "./bar", None)
        .unwrap_err();

    match &err {
        ResolutionError::FailedToResolvePath {
            file_candidates,
            dir_candidates,
            ..
        } => {
            assert!(file_candidates.contains(&PathBuf::from("/p/src/bar.js")));
            assert!(dir_candidates.contains(&PathBuf::from("/p/src/bar/index.js")));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let message = err.to_string();
    assert!(message.contains("/p/src/bar.js"));
    assert!(message.contains("/p/src/bar/index.js"));
}

#[test]
fn failed_name_error_lists_searched_directories() {
    let resolver = Fixture::new().file("/p/node_modules/other/index.js").build();

    let err = resolver
        .resolve(Path::new("/p/src/app.js"), "missing-pkg", None)
        .unwrap_err();

    match err {
        ResolutionError::FailedToResolveName { searched_dirs, .. } => {
            assert!(searched_dirs.contains(&PathBuf::from("/p/node_modules")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn url_schemes_are_unsupported() {
    let resolver = Fixture::new().build();
    let err = resolver
        .resolve(Path::new("/p/src/app.js"), "http://example.com/x.js", None)
        .unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::FailedToResolveUnsupported { .. }
    ));
}

#[test]
fn resolution_is_deterministic() {
    let resolver = Fixture::new()
        .file("/p/src/utils.js")
        .file("/p/src/utils.android.js")
        .build();

    let first = resolver
        .resolve(Path::new("/p/src/app.js"), "./utils", Some("android"))
        .unwrap();
    let second = resolver
        .resolve(Path::new("/p/src/app.js"), "./utils", Some("android"))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn package_exports_resolve_the_root_subpath() {
    let resolver = Fixture::new()
        .file_with(
            "/p/node_modules/modern/package.json",
            r#"{"exports": {".": {"react-native": "./rn.js", "default": "./main.js"}}}"#,
        )
        .file("/p/node_modules/modern/rn.js")
        .file("/p/node_modules/modern/main.js")
        .options(|options| {
            options.enable_package_exports = true;
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "modern", None)
            .unwrap(),
        source("/p/node_modules/modern/rn.js")
    );
}

#[test]
fn package_exports_cover_subpaths() {
    let resolver = Fixture::new()
        .file_with(
            "/p/node_modules/modern/package.json",
            r#"{"exports": {"./feature": "./lib/feature.js"}}"#,
        )
        .file("/p/node_modules/modern/lib/feature.js")
        .options(|options| {
            options.enable_package_exports = true;
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "modern/feature", None)
            .unwrap(),
        source("/p/node_modules/modern/lib/feature.js")
    );
}

#[test]
fn conditions_by_platform_extend_the_base_set() {
    let resolver = Fixture::new()
        .file_with(
            "/p/node_modules/modern/package.json",
            r#"{"exports": {".": {"ios-only": "./ios.js", "default": "./main.js"}}}"#,
        )
        .file("/p/node_modules/modern/ios.js")
        .file("/p/node_modules/modern/main.js")
        .options(|options| {
            options.enable_package_exports = true;
            options
                .conditions_by_platform
                .insert("ios".into(), vec!["ios-only".into()]);
        })
        .build();

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "modern", Some("ios"))
            .unwrap(),
        source("/p/node_modules/modern/ios.js")
    );
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "modern", Some("android"))
            .unwrap(),
        source("/p/node_modules/modern/main.js")
    );
}

#[test]
fn resolve_request_hook_can_delegate_back() {
    let fixture = Fixture::new().file("/p/src/real.js");
    let lookup: Arc<dyn crate::FileSystemLookup> = fixture.fs.clone();
    let resolver = Resolver::new(PathBuf::from("/p"), fixture.options, lookup)
        .with_resolve_request(Arc::new(|ctx, specifier, platform| {
        if specifier == "virtual:stub" {
            return Ok(Resolution::Empty);
        }
        ctx.resolve(specifier, platform)
    }));

    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "virtual:stub", None)
            .unwrap(),
        Resolution::Empty
    );
    assert_eq!(
        resolver
            .resolve(Path::new("/p/src/app.js"), "./real", None)
            .unwrap(),
        source("/p/src/real.js")
    );
}
