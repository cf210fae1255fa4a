//! Process-wide registry of named random replacements consulted by the
//! `gen` argument type. Modeled as an immutable lookup table initialized
//! once at startup rather than global mutable state. No fake-data crate
//! is pulled in; the handful of named generators here are hand-rolled
//! atop `uuid`, `chrono` and `rand`.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Margaret", "Linus", "Barbara", "Donald", "Katherine",
];
const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Hamilton", "Torvalds", "Liskov", "Knuth", "Johnson",
];
const CITIES: &[&str] = &["London", "Austin", "Berlin", "Nairobi", "Osaka", "Toronto"];
const COUNTRIES: &[&str] = &["UK", "US", "DE", "KE", "JP", "CA"];
const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit",
];

pub type Generator = fn() -> String;

pub static REPLACEMENTS: LazyLock<HashMap<&'static str, Generator>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Generator> = HashMap::new();
    m.insert("${uuid}", gen_uuid);
    m.insert("${first_name}", gen_first_name);
    m.insert("${last_name}", gen_last_name);
    m.insert("${email}", gen_email);
    m.insert("${city}", gen_city);
    m.insert("${country}", gen_country);
    m.insert("${phone}", gen_phone);
    m.insert("${word}", gen_word);
    m.insert("${date}", gen_date);
    m.insert("${datetime}", gen_datetime);
    m
});

fn gen_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn gen_first_name() -> String {
    FIRST_NAMES.choose(&mut rand::thread_rng()).unwrap().to_string()
}

fn gen_last_name() -> String {
    LAST_NAMES.choose(&mut rand::thread_rng()).unwrap().to_string()
}

fn gen_email() -> String {
    format!(
        "{}.{}@example.com",
        gen_first_name().to_lowercase(),
        gen_last_name().to_lowercase()
    )
}

fn gen_city() -> String {
    CITIES.choose(&mut rand::thread_rng()).unwrap().to_string()
}

fn gen_country() -> String {
    COUNTRIES.choose(&mut rand::thread_rng()).unwrap().to_string()
}

fn gen_phone() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "+1-{:03}-{:03}-{:04}",
        rng.gen_range(200..999),
        rng.gen_range(200..999),
        rng.gen_range(0..9999)
    )
}

fn gen_word() -> String {
    WORDS.choose(&mut rand::thread_rng()).unwrap().to_string()
}

fn gen_date() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn gen_datetime() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_uuid() {
        assert!(REPLACEMENTS.contains_key("${uuid}"));
        let v = (REPLACEMENTS["${uuid}"])();
        assert_eq!(v.len(), 36);
    }

    #[test]
    fn every_generator_returns_non_empty() {
        for (name, g) in REPLACEMENTS.iter() {
            assert!(!g().is_empty(), "generator {name} returned empty string");
        }
    }
}
