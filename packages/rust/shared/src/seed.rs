//! Static seed list used to bootstrap an empty registry.

use crate::types::Entity;

/// Registered banks and their inheritance-procedure pages.
pub const SEED_ENTITIES: &[(&str, &str)] = &[
    ("三菱UFJ銀行", "https://www.bk.mufg.jp/tsukau/tetsuduki/souzoku/index.html"),
    ("三井住友銀行", "https://www.smbc.co.jp/kojin/souzoku/"),
    ("みずほ銀行", "https://www.mizuhobank.co.jp/retail/products/souzoku/index.html"),
    ("ゆうちょ銀行", "https://www.jp-bank.japanpost.jp/kojin/tetuzuki/souzoku/kj_tzk_szk_index.html"),
    ("りそな銀行", "https://www.resonabank.co.jp/kojin/souzoku/"),
    ("埼玉りそな銀行", "https://www.saitamaresona.co.jp/kojin/souzoku/"),
    ("横浜銀行", "https://www.boy.co.jp/kojin/tetuzuki/souzoku/"),
    ("千葉銀行", "https://www.chibabank.co.jp/kojin/procedure/inheritance/"),
    ("福岡銀行", "https://www.fukuokabank.co.jp/personal/service/souzoku/"),
    ("静岡銀行", "https://www.shizuokabank.co.jp/personal/procedure/inheritance"),
    ("常陽銀行", "https://www.joyobank.co.jp/personal/service/souzoku/"),
    ("楽天銀行", "https://www.rakuten-bank.co.jp/support/inheritance/"),
    ("住信SBIネット銀行", "https://www.netbk.co.jp/contents/support/form/inheritance/"),
    ("ソニー銀行", "https://moneykit.net/visitor/support/inheritance.html"),
    ("auじぶん銀行", "https://www.jibunbank.co.jp/procedure/inheritance/"),
    ("三井住友信託銀行", "https://www.smtb.jp/personal/procedure/inheritance"),
    ("三菱UFJ信託銀行", "https://www.tr.mufg.jp/shisan/souzoku_tetsuzuki.html"),
    ("みずほ信託銀行", "https://www.mizuho-tb.co.jp/souzoku/tetsuzuki/"),
];

/// Build the seeded registry: names and URLs only, every fact the sentinel.
pub fn seed_entities() -> Vec<Entity> {
    SEED_ENTITIES
        .iter()
        .map(|(name, url)| Entity::seeded(*name, Some(*url)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn seed_names_are_unique() {
        let names: HashSet<&str> = SEED_ENTITIES.iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), SEED_ENTITIES.len());
    }

    #[test]
    fn seed_urls_parse() {
        for (name, url) in SEED_ENTITIES {
            assert!(url::Url::parse(url).is_ok(), "bad seed URL for {name}");
        }
    }

    #[test]
    fn seeded_entities_start_empty() {
        let entities = seed_entities();
        assert_eq!(entities.len(), SEED_ENTITIES.len());
        assert!(entities.iter().all(|e| !e.has_cached_facts()));
    }
}
