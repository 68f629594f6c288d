use crate::token::Token;

/// The canonical lookup key of a token range, plus the value-carrying tokens it abstracts over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHash {
    pub key: String,
    pub slots: Vec<Token>,
}

/// One edge of the syntax trie. `Any` stands for a variable or literal in that position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrieKey {
    Any,
    Word(String),
}

impl TrieKey {
    /// Edge for a token: slot tokens go down the `Any` edge, wording matches case-insensitively.
    pub fn of(token: &Token) -> Option<TrieKey> {
        if token.is_slot() {
            Some(TrieKey::Any)
        } else if token.is_literal() {
            Some(TrieKey::Word(token.text.to_lowercase()))
        } else {
            None
        }
    }
}

/// Reduce `tokens` to a key made of the command's wording, collecting every slot token in order.
///
/// Whitespace and comment tokens contribute to neither.
pub fn hash(tokens: &[Token]) -> SignatureHash {
    let mut key = String::new();
    let mut slots = Vec::new();

    for token in tokens {
        if token.is_slot() {
            slots.push(token.clone());
        } else if token.is_literal() {
            if !key.is_empty() {
                key.push(' ');
            }
            key.push_str(&token.text.to_lowercase());
        }
    }

    SignatureHash { key, slots }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_values_do_not_change_the_key() {
        let a = hash(&tokenize("$ship -> fly to sector {Argon Prime} with speed 120"));
        let b = hash(&tokenize("$other -> FLY to sector {Paranid Prime} with speed -7"));
        assert_eq!(a.key, b.key);
        assert_eq!(a.key, "-> fly to sector with speed");
        assert_eq!(a.slots.len(), 3);
        assert_eq!(b.slots[2].text, "-7");
    }

    #[test]
    fn test_slots_keep_order_and_kind() {
        let hashed = hash(&tokenize("write to log 'hello' $x [TRUE] null"));
        let texts: Vec<&str> = hashed.slots.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["'hello'", "$x", "[TRUE]", "null"]);
        assert_eq!(hashed.key, "write to log");
    }

    #[test]
    fn test_different_wording_differs() {
        let a = hash(&tokenize("$a -> get name"));
        let b = hash(&tokenize("$a -> get owner"));
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_trie_keys() {
        let keys: Vec<TrieKey> = tokenize("$0 -> Get 120").iter().filter_map(TrieKey::of).collect();
        assert_eq!(
            keys,
            vec![
                TrieKey::Any,
                TrieKey::Word("->".into()),
                TrieKey::Word("get".into()),
                TrieKey::Any
            ]
        );
        assert_eq!(TrieKey::of(&tokenize("* only a comment")[0]), None);
    }
}
