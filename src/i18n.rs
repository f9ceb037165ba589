// i18n.rs
//
// Runtime lookup for widget texts (notice, control tooltips).
// - Strings are embedded from assets/i18n.json, format: { "<lang>": { "key": "value" } }
// - Lookup order: selected lang -> fallback en -> the key itself
// - tr("key") / tr_with("key", &[("name", "...")]) with {name} placeholders
//
// Language selection: settings.language, else the browser locale, else en.

use once_cell::sync::{Lazy, OnceCell};
use std::{collections::HashMap, sync::RwLock};

const FALLBACK_LANG: &str = "en";

type LangTable = HashMap<String, HashMap<String, String>>;

static TABLE: Lazy<LangTable> = Lazy::new(|| {
    serde_json::from_str(include_str!("../assets/i18n.json")).unwrap_or_else(|e| {
        log::error!("embedded i18n table is malformed: {e}");
        HashMap::new()
    })
});

#[derive(Debug, Clone)]
struct I18n {
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn load_lang(lang: &str) -> HashMap<String, String> {
    TABLE.get(lang).cloned().unwrap_or_default()
}

/// Initialize global i18n. Safe to call multiple times; later calls overwrite current lang maps.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = load_lang(&lang);
    if map.is_empty() {
        log::debug!("no strings for language {lang}, using {FALLBACK_LANG}");
    }
    let i = I18n {
        fallback_map: load_lang(FALLBACK_LANG),
        map,
    };

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else {
        let _ = I18N.set(RwLock::new(i));
    }
}

fn get_locked() -> Option<std::sync::RwLockReadGuard<'static, I18n>> {
    I18N.get().and_then(|l| l.read().ok())
}

/// Get localized text by key. Before [`init`] the fallback language is used;
/// a missing key returns the key itself.
pub fn tr(key: &str) -> String {
    if let Some(i) = get_locked() {
        if let Some(v) = i.map.get(key).or_else(|| i.fallback_map.get(key)) {
            return v.clone();
        }
        return key.to_string();
    }
    TABLE
        .get(FALLBACK_LANG)
        .and_then(|m| m.get(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

/// Get localized text and substitute `{name}` placeholders.
/// Any placeholder not provided is kept as-is.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    let mut s = tr(key);
    for (k, v) in args {
        let placeholder = format!("{{{}}}", k);
        s = s.replace(&placeholder, v);
    }
    s
}

/// Pick a supported language: explicit setting first, then the browser
/// locale (`ja-JP` → `ja`), then en.
pub fn resolve_lang(setting: Option<&str>, locale: Option<&str>) -> String {
    [setting, locale]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .find_map(|code| {
            if TABLE.contains_key(code) {
                return Some(code.to_string());
            }
            let primary = code.split(['-', '_']).next()?.to_lowercase();
            TABLE.contains_key(&primary).then_some(primary)
        })
        .unwrap_or_else(|| FALLBACK_LANG.to_string())
}
