// build.rs
//
// Generates the `t!` macro from `locales/<lang>.toml`. Missing keys fall back to
// English; a key missing from every file is a compile error at the call site.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

const FALLBACK_LANG: &str = "en";
const LANG_ENV: &str = "OPENSEES_RUN_LANG";

fn main() {
    // --- 1. Pick the language: a `lang_*` feature wins over the environment ---
    let mut active_langs: Vec<String> = env::vars()
        .filter_map(|(key, _)| key.strip_prefix("CARGO_FEATURE_LANG_").map(str::to_lowercase))
        .collect();
    active_langs.sort();

    let lang = match active_langs.first() {
        Some(first) => {
            if active_langs.len() > 1 {
                println!(
                    "cargo:warning=Multiple language features enabled ({:?}). Using '{}'.",
                    active_langs, first
                );
            }
            first.clone()
        }
        None => env::var(LANG_ENV).unwrap_or_else(|_| FALLBACK_LANG.to_string()),
    };

    println!("cargo:rustc-env=OPENSEES_RUN_LANG_EFFECTIVE={}", lang);
    println!("cargo:rerun-if-env-changed={}", LANG_ENV);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    // --- 2. English first, then the selected language on top ---
    let mut translations = read_locale(FALLBACK_LANG)
        .unwrap_or_else(|| panic!("Missing fallback language file: locales/{}.toml", FALLBACK_LANG));

    if lang != FALLBACK_LANG {
        match read_locale(&lang) {
            Some(specific) => translations.extend(specific),
            None => println!(
                "cargo:warning=Language file 'locales/{}.toml' not found. Falling back to '{}'.",
                lang, FALLBACK_LANG
            ),
        }
    }

    // --- 3. Generate the macro ---
    let mut macro_code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, value) in &translations {
        let escaped_value = value.replace('\\', "\\\\").replace('"', "\\\"");
        macro_code.push_str(&format!("    (\"{}\") => {{ \"{}\" }};\n", key, escaped_value));
    }
    macro_code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    macro_code.push('}');

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("translations.rs");
    fs::write(&dest_path, macro_code).expect("Failed to write translations.rs");
}

fn read_locale(lang: &str) -> Option<BTreeMap<String, String>> {
    let path = format!("locales/{}.toml", lang);
    let content = fs::read_to_string(&path).ok()?;
    let parsed = toml::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse {}: {}", path, e));
    Some(parsed)
}
