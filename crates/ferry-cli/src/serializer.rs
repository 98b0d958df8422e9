//! Trivial bundle serialization.
//!
//! The core hands over a finished module set; this concatenates code modules
//! in module-ID order with a header comment per module. Assets are emitted as
//! manifest comments pointing at their primary variant — real asset handling
//! belongs to the embedder's packager.

use std::path::Path;

use anyhow::Context;
use ferry_graph::{Module, ModuleOutput};

pub fn write_bundle(out: &Path, project_root: &Path, modules: &[Module]) -> anyhow::Result<()> {
    let mut ordered: Vec<&Module> = modules.iter().collect();
    ordered.sort_by_key(|module| module.id);

    let mut bundle = String::new();
    for module in ordered {
        let display = module
            .path
            .as_path()
            .strip_prefix(project_root)
            .unwrap_or(module.path.as_path());

        match module.output.as_ref() {
            ModuleOutput::Code { code, .. } => {
                bundle.push_str(&format!("// [{}] {}\n", module.id, display.display()));
                bundle.push_str(code);
                if !code.ends_with('\n') {
                    bundle.push('\n');
                }
            }
            ModuleOutput::Asset(asset) => {
                let primary = asset
                    .primary_file()
                    .map(|file| file.display().to_string())
                    .unwrap_or_default();
                bundle.push_str(&format!(
                    "// [{}] asset {} -> {}\n",
                    module.id,
                    display.display(),
                    primary
                ));
            }
        }
    }

    std::fs::write(out, bundle).with_context(|| format!("cannot write {}", out.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_graph::ModulePath;
    use tempfile::TempDir;

    fn module(path: &str, id: u32, code: &str) -> Module {
        Module::new(
            ModulePath::new(path).unwrap(),
            id,
            [0; 32],
            ModuleOutput::Code {
                code: code.to_string(),
                map: None,
            },
        )
    }

    #[test]
    fn modules_are_emitted_in_id_order() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("bundle.js");

        let modules = vec![
            module("/p/b.js", 1, "var b = 1;"),
            module("/p/a.js", 0, "var a = 0;"),
        ];
        write_bundle(&out, Path::new("/p"), &modules).unwrap();

        let bundle = std::fs::read_to_string(&out).unwrap();
        let a_at = bundle.find("var a").unwrap();
        let b_at = bundle.find("var b").unwrap();
        assert!(a_at < b_at);
        assert!(bundle.contains("// [0] a.js"));
    }
}
