use sha2::{Digest, Sha256};

use crate::event::UserData;

/// Raw identity fields recognized by the platform's `user_data` matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Lower-case and trim. Empty input yields `None`: an absent field must be
/// omitted, never hashed as an empty placeholder.
fn normalize(value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Phone numbers must be digits-only before hashing. Anything else produces
/// a digest the platform will never match against its own records.
fn normalize_phone(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

fn prepare(value: Option<&str>, hashing: bool) -> Option<String> {
    let normalized = normalize(value?)?;
    if hashing {
        Some(sha256_hex(&normalized))
    } else {
        Some(normalized)
    }
}

fn prepare_phone(value: Option<&str>, hashing: bool) -> Option<String> {
    let normalized = normalize_phone(value?)?;
    if hashing {
        Some(sha256_hex(&normalized))
    } else {
        Some(normalized)
    }
}

/// Build the hashed identity portion of `user_data`. Pure, no side effects.
///
/// With `hashing` disabled (test-event debugging) the normalized raw values
/// pass through instead of their digests.
pub fn user_data_for(identity: &Identity, hashing: bool) -> UserData {
    UserData {
        em: prepare(identity.email.as_deref(), hashing),
        ph: prepare_phone(identity.phone.as_deref(), hashing),
        first_name: prepare(identity.first_name.as_deref(), hashing),
        last_name: prepare(identity.last_name.as_deref(), hashing),
        date_of_birth: prepare(identity.date_of_birth.as_deref(), hashing),
        gender: prepare(identity.gender.as_deref(), hashing),
        city: prepare(identity.city.as_deref(), hashing),
        state: prepare(identity.state.as_deref(), hashing),
        zip_code: prepare(identity.zip_code.as_deref(), hashing),
        country: prepare(identity.country.as_deref(), hashing),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_normalizes_before_digesting() {
        let noisy = Identity {
            email: Some("Test@Example.com ".to_string()),
            ..Default::default()
        };
        let clean = Identity {
            email: Some("test@example.com".to_string()),
            ..Default::default()
        };

        assert_eq!(
            user_data_for(&noisy, true).em,
            user_data_for(&clean, true).em
        );
    }

    #[test]
    fn phone_numbers_are_stripped_to_digits() {
        let formatted = Identity {
            phone: Some("+55 (11) 98765-4321".to_string()),
            ..Default::default()
        };
        let digits = Identity {
            phone: Some("5511987654321".to_string()),
            ..Default::default()
        };

        let hashed = user_data_for(&formatted, true);
        assert_eq!(hashed.ph, user_data_for(&digits, true).ph);
        assert_eq!(hashed.ph.as_deref(), Some(sha256_hex("5511987654321")).as_deref());
    }

    #[test]
    fn absent_and_blank_fields_are_omitted() {
        let identity = Identity {
            email: Some("   ".to_string()),
            phone: Some("ext.".to_string()),
            ..Default::default()
        };

        let user_data = user_data_for(&identity, true);
        assert_eq!(user_data, UserData::default());
    }

    #[test]
    fn disabled_hashing_passes_normalized_values_through() {
        let identity = Identity {
            email: Some(" Buyer@Shop.COM".to_string()),
            city: Some("São Paulo".to_string()),
            ..Default::default()
        };

        let user_data = user_data_for(&identity, false);
        assert_eq!(user_data.em.as_deref(), Some("buyer@shop.com"));
        assert_eq!(user_data.city.as_deref(), Some("são paulo"));
    }

    #[test]
    fn all_recognized_fields_are_covered() {
        let identity = Identity {
            email: Some("a@b.com".to_string()),
            phone: Some("123".to_string()),
            first_name: Some("Ana".to_string()),
            last_name: Some("Silva".to_string()),
            date_of_birth: Some("19900101".to_string()),
            gender: Some("F".to_string()),
            city: Some("Recife".to_string()),
            state: Some("PE".to_string()),
            zip_code: Some("50000".to_string()),
            country: Some("BR".to_string()),
        };

        let user_data = user_data_for(&identity, true);
        for digest in [
            &user_data.em,
            &user_data.ph,
            &user_data.first_name,
            &user_data.last_name,
            &user_data.date_of_birth,
            &user_data.gender,
            &user_data.city,
            &user_data.state,
            &user_data.zip_code,
            &user_data.country,
        ] {
            assert_eq!(digest.as_ref().map(String::len), Some(64));
        }
    }
}
