//! Incident reference numbers: `T IR HH NNNN C`.
//!
//! `T` is the incident kind code, `HH` the home's creation-order rank and
//! `NNNN` the per-home sequence, both zero-padded upper-case base 36. `C` is a
//! Luhn mod 36 check character over the first nine characters, so any single
//! mistyped character is detected.
//!
//! The sequence is the home's incident count plus one, raised past the
//! sequence of the home's newest reference number so that deleting an older
//! draft never hands out a number that is still in use. Only deleting the
//! newest draft frees its number again.
//!
//! Rank and sequence are read from a snapshot of the store without locking.
//! Two incidents created concurrently for the same home can receive the same
//! sequence.

use mongodb::bson::oid::ObjectId;

use crate::{
    error::{IncidentError, IncidentResult},
    models::{home::Home, incident::IncidentKind},
    store::IncidentStore,
};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const KIND_CODES: [char; 7] = ['F', 'M', 'B', 'X', 'I', 'E', 'O'];
const PREFIX: &str = "IR";
const HOME_WIDTH: usize = 2;
const SEQUENCE_WIDTH: usize = 4;

pub const REFERENCE_LENGTH: usize = 1 + PREFIX.len() + HOME_WIDTH + SEQUENCE_WIDTH + 1;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceNumberError {
    #[error("home rank {0} does not fit in two base-36 digits")]
    HomeRankOutOfRange(u64),

    #[error("sequence {0} does not fit in four base-36 digits")]
    SequenceOutOfRange(u64),
}

fn value_of(character: char) -> Option<u32> {
    character.to_digit(36)
}

fn to_base36(mut value: u64, width: usize) -> Option<String> {
    let mut digits: Vec<u8> = Vec::with_capacity(width);
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    if digits.len() > width {
        return None;
    }
    digits.resize(width, b'0');
    digits.reverse();
    String::from_utf8(digits).ok()
}

/// Luhn mod 36 check character for `payload`, or `None` when the payload holds
/// a character outside `0-9A-Z` (either case).
pub fn checksum(payload: &str) -> Option<char> {
    let mut factor: u32 = 2;
    let mut sum: u32 = 0;

    for character in payload.chars().rev() {
        let mut addend = factor * value_of(character)?;
        addend = addend / 36 + addend % 36;
        sum += addend;
        factor = if factor == 2 { 1 } else { 2 };
    }

    let index = (36 - sum % 36) % 36;
    Some(ALPHABET[index as usize] as char)
}

pub fn generate(
    kind: IncidentKind,
    home_rank: u64,
    sequence: u64,
) -> Result<String, ReferenceNumberError> {
    let home = to_base36(home_rank, HOME_WIDTH)
        .ok_or(ReferenceNumberError::HomeRankOutOfRange(home_rank))?;
    let sequence = to_base36(sequence, SEQUENCE_WIDTH)
        .ok_or(ReferenceNumberError::SequenceOutOfRange(sequence))?;

    let payload = format!("{}{}{}{}", kind.code(), PREFIX, home, sequence);
    // payload is built from ALPHABET only
    let check = checksum(&payload).unwrap_or('0');

    Ok(format!("{}{}", payload, check))
}

/// The `NNNN` sequence encoded in a reference number.
pub fn sequence_of(reference_number: &str) -> Option<u64> {
    let start = 1 + PREFIX.len() + HOME_WIDTH;
    let digits = reference_number.get(start..start + SEQUENCE_WIDTH)?;
    u64::from_str_radix(digits, 36).ok()
}

pub fn validate(candidate: &str) -> bool {
    let candidate = candidate.to_ascii_uppercase();
    if candidate.chars().count() < REFERENCE_LENGTH || !candidate.is_ascii() {
        return false;
    }

    match candidate.chars().next() {
        Some(code) if KIND_CODES.contains(&code) => (),
        _ => return false,
    }
    if !candidate[1..].starts_with(PREFIX) {
        return false;
    }

    let (payload, provided) = candidate.split_at(candidate.len() - 1);
    match checksum(payload) {
        Some(expected) => provided.starts_with(expected),
        None => false,
    }
}

/// 1-based position of `home_id` among `homes` ordered by creation time, ties
/// broken by id.
pub fn home_rank(homes: &[Home], home_id: &ObjectId) -> Option<u64> {
    let mut ordered: Vec<&Home> = homes.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a._id.cmp(&b._id)));

    ordered
        .iter()
        .position(|home| &home._id == home_id)
        .map(|index| index as u64 + 1)
}

/// Computes the next reference number for an incident at `home_id`.
pub async fn assign(
    store: &dyn IncidentStore,
    kind: IncidentKind,
    home_id: &ObjectId,
) -> IncidentResult<String> {
    let homes = store.find_homes().await?;
    let rank = home_rank(&homes, home_id)
        .ok_or_else(|| IncidentError::NotFound("HOME_NOT_FOUND".to_string()))?;
    let issued = match store.find_latest_reference_by_home(home_id).await? {
        Some(reference_number) => sequence_of(&reference_number).unwrap_or(0),
        None => 0,
    };
    let sequence = (store.count_incidents_by_home(home_id).await? + 1).max(issued + 1);

    generate(kind, rank, sequence)
        .map_err(|error| IncidentError::StateConflict(format!("REFERENCE_NUMBER_EXHAUSTED: {}", error)))
}
