use postgres_types::{FromSql, Type};
use std::error::Error;

/// Version byte that prefixes the binary JSONB format.
pub(crate) const JSONB_VERSION: u8 = 1;

/// Raw bytes of a `json` or `jsonb` column, NULL included.
///
/// Document columns can't be read as `Vec<u8>` directly because the JSON
/// types have their own OIDs.
pub(crate) struct RawJson(pub Option<Vec<u8>>);

impl RawJson {
    /// The JSON text, without the JSONB version prefix.
    pub fn text<'a>(bytes: &'a [u8], ty: &Type) -> &'a [u8] {
        if *ty == Type::JSONB && bytes.first() == Some(&JSONB_VERSION) {
            &bytes[1..]
        } else {
            bytes
        }
    }
}

impl<'a> FromSql<'a> for RawJson {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawJson(Some(raw.to_vec())))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawJson(None))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON || *ty == Type::JSONB
    }
}
