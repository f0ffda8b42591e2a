//! Message text personalization.
//!
//! Card messages are personalized by locating English phrases ("your",
//! "a tree") or the literal `<name here>` marker and splicing in the
//! recipient's first name, an optional relation word, and plural forms.
//! The substitution rules reproduce the historical behavior byte-for-byte;
//! rendered cards in the field depend on it. The string-search approach is
//! locale-specific by nature - structured template tokens are the likely
//! replacement if localization ever lands.

/// Event type code for memorial gifts.
pub const MEMORIAL_EVENT_TYPE: &str = "2";

/// Marker the memorial template uses for name insertion.
const NAME_MARKER: &str = "<name here>";

/// Default primary message for general gifting.
pub const DEFAULT_PRIMARY_MESSAGE: &str = "We are immensely delighted to share that a tree has been planted in your name at the 14 Trees Foundation, Pune. This tree will be nurtured in your honour, rejuvenating ecosystems, supporting biodiversity, and helping offset the harmful effects of climate change.";

/// Default primary message for birthday gifting.
pub const DEFAULT_BIRTHDAY_MESSAGE: &str = "We are immensely delighted to share that a tree has been planted in your name on the occasion of your birthday at the 14 Trees Foundation, Pune. This tree will be nurtured in your honour, helping offset the harmful effects of climate change.";

/// Default primary message for memorial gifting.
pub const DEFAULT_MEMORIAL_MESSAGE: &str = "A tree has been planted in the memory of <name here> at the 14 Trees Foundation reforestation site. For many years, this tree will help rejuvenate local ecosystems, support local biodiversity and offset the harmful effects of climate change and global warming.";

/// Default secondary message.
pub const DEFAULT_SECONDARY_MESSAGE: &str = "We invite you to visit 14 Trees and firsthand experience the growth and contribution of your tree towards a greener future.";

/// Default logo line.
pub const DEFAULT_LOGO_MESSAGE: &str = "Gifted by 14 Trees in partnership with";

/// First whitespace-separated token of a name.
fn first_name(user_name: &str) -> &str {
    user_name.split(' ').next().unwrap_or(user_name)
}

/// Personalizes a primary message with the recipient's name.
///
/// Memorial messages (`event_type == "2"`) substitute the literal
/// `<name here>` marker; all other messages rewrite the first occurrence of
/// the word "your". A relation word is spliced in unless it is "other".
/// Messages without the expected phrase come back unchanged.
pub fn personalized_message(
    primary_message: &str,
    user_name: &str,
    event_type: Option<&str>,
    relation: Option<&str>,
) -> String {
    let name = first_name(user_name);
    let relation = relation.filter(|r| *r != "other");

    if event_type == Some(MEMORIAL_EVENT_TYPE) {
        let Some(index) = primary_message.find(NAME_MARKER) else {
            return primary_message.to_string();
        };
        let head = &primary_message[..index];
        let tail = &primary_message[index + NAME_MARKER.len()..];

        match relation {
            Some(relation) => {
                format!("{head}your {} {name}{tail}", relation.to_lowercase())
            }
            None => format!("{head}{name}{tail}"),
        }
    } else {
        let Some(index) = primary_message.find("your") else {
            return primary_message.to_string();
        };
        let tail = &primary_message[index + 4..];

        match relation {
            Some(relation) => {
                // Keep "your" plus the character after it (usually a space)
                // in front of the relation word; that character shows up
                // again at the start of the tail, matching the historical
                // output
                let head_end = primary_message[index + 4..]
                    .chars()
                    .next()
                    .map_or(index + 4, |c| index + 4 + c.len_utf8());
                let head = &primary_message[..head_end];
                format!("{head}{} {name}'s{tail}", relation.to_lowercase())
            }
            None => {
                let head = &primary_message[..index];
                format!("{head}{name}'s{tail}")
            }
        }
    }
}

/// Rewrites singular tree phrasing into plural for recipients receiving more
/// than one tree.
///
/// The first "a tree"/"A tree" becomes "{count} trees" (each computed from
/// the original message, so a capitalized match wins over a lowercase one),
/// then the fixed phrase replacements run globally.
pub fn pluralized_message(primary_message: &str, count: u64) -> String {
    let mut message = primary_message.to_string();

    if let Some(index) = primary_message.find("a tree") {
        message = format!(
            "{}{count} trees{}",
            &primary_message[..index],
            &primary_message[index + 6..]
        );
    }
    if let Some(index) = primary_message.find("A tree") {
        message = format!(
            "{}{count} trees{}",
            &primary_message[..index],
            &primary_message[index + 6..]
        );
    }

    message = message.replace("This tree", "These trees");
    message = message.replace(" tree ", " trees ");
    message = message.replace(" trees has ", " trees have ");

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_message_name_substitution() {
        let message = personalized_message(DEFAULT_PRIMARY_MESSAGE, "Jane Doe", None, None);
        assert!(message.contains("planted in Jane's name at the 14 Trees Foundation"));
        assert!(!message.contains("planted in your name"));
    }

    #[test]
    fn test_default_message_with_relation() {
        let message = personalized_message(DEFAULT_PRIMARY_MESSAGE, "Jane Doe", None, Some("Aunt"));
        assert!(message.contains("planted in your aunt Jane's name"));
    }

    #[test]
    fn test_relation_with_multibyte_char_after_your() {
        // The character following "your" may be multibyte; the splice must
        // stay on char boundaries and still duplicate it like the space case
        let message = personalized_message(
            "planted in your\u{2019}s honour",
            "Jane Doe",
            None,
            Some("Aunt"),
        );
        assert_eq!(message, "planted in your\u{2019}aunt Jane's\u{2019}s honour");
    }

    #[test]
    fn test_relation_other_is_ignored() {
        let with_other =
            personalized_message(DEFAULT_PRIMARY_MESSAGE, "Jane Doe", None, Some("other"));
        let without = personalized_message(DEFAULT_PRIMARY_MESSAGE, "Jane Doe", None, None);
        assert_eq!(with_other, without);
    }

    #[test]
    fn test_memorial_marker_substitution() {
        let message = personalized_message(
            DEFAULT_MEMORIAL_MESSAGE,
            "John Smith",
            Some(MEMORIAL_EVENT_TYPE),
            None,
        );
        assert!(message.contains("in the memory of John at the 14 Trees Foundation"));
        assert!(!message.contains(NAME_MARKER));
    }

    #[test]
    fn test_memorial_with_relation() {
        let message = personalized_message(
            DEFAULT_MEMORIAL_MESSAGE,
            "John Smith",
            Some(MEMORIAL_EVENT_TYPE),
            Some("Father"),
        );
        assert!(message.contains("in the memory of your father John at"));
    }

    #[test]
    fn test_message_without_expected_phrase_is_unchanged() {
        assert_eq!(
            personalized_message("No marker here.", "Jane", None, None),
            "No marker here."
        );
        assert_eq!(
            personalized_message("No marker here.", "Jane", Some(MEMORIAL_EVENT_TYPE), None),
            "No marker here."
        );
    }

    #[test]
    fn test_only_first_name_is_used() {
        let message =
            personalized_message(DEFAULT_PRIMARY_MESSAGE, "Jane Alexandra Doe", None, None);
        assert!(message.contains("Jane's name"));
        assert!(!message.contains("Alexandra"));
    }

    #[test]
    fn test_pluralization_of_default_message() {
        let message = pluralized_message(DEFAULT_PRIMARY_MESSAGE, 3);
        assert!(message.contains("share that 3 trees have been planted"));
        assert!(message.contains("These trees will be nurtured"));
        assert!(!message.contains("a tree"));
    }

    #[test]
    fn test_pluralization_of_memorial_message() {
        let message = pluralized_message(DEFAULT_MEMORIAL_MESSAGE, 2);
        assert!(message.starts_with("2 trees have been planted in the memory"));
        // Lowercase "this tree" only gets the generic " tree " substitution
        assert!(message.contains("this trees will help rejuvenate"));
    }

    #[test]
    fn test_capitalized_match_wins_when_both_present() {
        // Compatibility quirk: both substitutions are computed from the
        // original message, so the capitalized one overwrites the lowercase
        // one when both phrases occur.
        let message = pluralized_message("A tree grows. We planted a tree for you.", 4);
        assert!(message.starts_with("4 trees grows."));
        // The lowercase occurrence survives untouched apart from the generic
        // " tree " substitution
        assert!(message.contains("planted a trees for you"));
    }

    #[test]
    fn test_substitution_is_deterministic() {
        let a = personalized_message(DEFAULT_BIRTHDAY_MESSAGE, "Ravi Kumar", Some("1"), None);
        let b = personalized_message(DEFAULT_BIRTHDAY_MESSAGE, "Ravi Kumar", Some("1"), None);
        assert_eq!(a, b);

        let c = pluralized_message(&a, 2);
        let d = pluralized_message(&b, 2);
        assert_eq!(c, d);
    }
}
