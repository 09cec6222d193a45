//! Board ids — memorable `adjective-animal-NN` names and the room they map to.

use rand::Rng;

const ADJECTIVES: [&str; 49] = [
    "happy", "sunny", "clever", "brave", "swift", "calm", "bright", "cool", "wild", "gentle", "eager", "fancy", "jolly",
    "lucky", "proud", "quick", "smart", "witty", "bold", "cozy", "daring", "fresh", "grand", "keen", "lively", "merry",
    "noble", "peppy", "royal", "shiny", "sleek", "snappy", "speedy", "spicy", "stellar", "super", "sweet", "tender",
    "tiny", "vivid", "warm", "zesty", "agile", "azure", "cosmic", "dreamy", "epic", "funky", "glowy",
];

const ANIMALS: [&str; 50] = [
    "penguin", "dolphin", "tiger", "eagle", "panda", "koala", "fox", "owl", "wolf", "bear", "rabbit", "falcon", "hawk",
    "lion", "otter", "seal", "whale", "zebra", "deer", "swan", "crane", "duck", "goose", "heron", "parrot", "raven",
    "robin", "sparrow", "turtle", "gecko", "lemur", "llama", "moose", "puma", "sloth", "badger", "beaver", "bobcat",
    "cougar", "coyote", "ferret", "gopher", "hedgehog", "jaguar", "kitten", "leopard", "meerkat", "ocelot", "peacock",
    "raccoon",
];

/// Relay rooms for boards carry this prefix.
pub const ROOM_PREFIX: &str = "openboard-";

/// Random board id such as `happy-penguin-42`.
#[must_use]
pub fn generate_board_id() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.random_range(0..ANIMALS.len())];
    let number: u8 = rng.random_range(0..100);
    format!("{adjective}-{animal}-{number}")
}

/// Two lowercase words and a one- or two-digit number, dash separated.
#[must_use]
pub fn is_valid_board_id(id: &str) -> bool {
    let parts: Vec<&str> = id.split('-').collect();
    let [adjective, animal, number] = parts.as_slice() else {
        return false;
    };
    let word = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase());
    word(adjective) && word(animal) && (1..=2).contains(&number.len()) && number.bytes().all(|b| b.is_ascii_digit())
}

/// `happy-penguin-42` becomes `Happy Penguin 42`.
#[must_use]
pub fn display_name(id: &str) -> String {
    id.split('-')
        .enumerate()
        .map(|(i, part)| {
            if i == 2 {
                return part.to_owned();
            }
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[must_use]
pub fn room_name(board_id: &str) -> String {
    format!("{ROOM_PREFIX}{board_id}")
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
