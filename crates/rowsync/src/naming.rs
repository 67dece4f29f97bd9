//! Field and type names to column and table names.

/// Translate a camel-case name to its snake-case storage name.
///
/// An underscore goes in front of every ASCII uppercase letter, the result is
/// lowercased, and a single leading underscore is stripped:
///
/// ```
/// assert_eq!(rowsync::translate("createdAt"), "created_at");
/// assert_eq!(rowsync::translate("UserAccount"), "user_account");
/// assert_eq!(rowsync::translate("already_snake"), "already_snake");
/// ```
///
/// Runs of capitals are split letter by letter (`userID` becomes `user_i_d`).
pub fn translate(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    match out.strip_prefix('_') {
        Some(rest) => rest.to_owned(),
        None => out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_translate() {
        assert_eq!(translate("id"), "id");
        assert_eq!(translate("createdAt"), "created_at");
        assert_eq!(translate("UserAccount"), "user_account");
        assert_eq!(translate("userID"), "user_i_d");
        assert_eq!(translate("_private"), "private");
        assert_eq!(translate("__double"), "_double");
        assert_eq!(translate(""), "");
    }

    #[test]
    fn test_colliding_names_translate_equal() {
        // The descriptor builder relies on detecting this.
        assert_eq!(translate("userName"), translate("user_name"));
    }

    proptest! {
        #[test]
        fn prop_snake_case_is_fixed_point(name in "[a-z][a-z0-9_]{0,20}") {
            prop_assert_eq!(translate(&name), name);
        }

        #[test]
        fn prop_output_has_no_ascii_uppercase(name in "[A-Za-z_]{0,24}") {
            prop_assert!(!translate(&name).chars().any(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn prop_idempotent(name in "[A-Za-z][A-Za-z0-9]{0,20}") {
            let once = translate(&name);
            prop_assert_eq!(translate(&once), once.clone());
        }
    }
}
