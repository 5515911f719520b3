//! Client-side scoring helpers.

use std::collections::HashSet;

/// Culture fit between an actor and a card, as the percentage (0-100,
/// rounded down) of the card's declared core values the actor shares.
///
/// Values are compared case-insensitively after trimming. Returns `None`
/// when the card declares no values.
pub fn culture_fit(actor_values: &[String], card_values: &[String]) -> Option<u8> {
    let normalize = |v: &String| v.trim().to_lowercase();

    let card: HashSet<String> = card_values
        .iter()
        .map(normalize)
        .filter(|v| !v.is_empty())
        .collect();
    if card.is_empty() {
        return None;
    }

    let actor: HashSet<String> = actor_values.iter().map(normalize).collect();
    let shared = card.intersection(&actor).count();

    Some((shared * 100 / card.len()) as u8)
}
