// SPDX-License-Identifier: Apache-2.0

use crate::keychain::Keychain;
use crate::node::Node;

/// The outcome of a single `get`/`put`/`delete` transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct KmResult {
    pub ok: bool,
    /// On success, the requested keychain. On failure, the longest prefix
    /// of the requested keychain that did resolve.
    pub last_good_key: Keychain,
    pub error_message: String,
    /// On success, the resulting subtree. `Node::Undefined` on failure.
    pub returned_node: Node,
}

impl KmResult {
    fn ok(key: Keychain, node: Node) -> Self {
        Self {
            ok: true,
            last_good_key: key,
            error_message: String::new(),
            returned_node: node,
        }
    }

    fn err(last_good_key: Keychain, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            last_good_key,
            error_message: message.into(),
            returned_node: Node::Undefined,
        }
    }
}

/// Traverses `root` along `keychain`'s mappings. Returns the resolved node
/// and, on failure, the longest prefix that did resolve plus a message.
fn traverse<'a>(root: &'a Node, keychain: &Keychain) -> Result<&'a Node, (Keychain, String)> {
    let mut current = root;
    for (i, component) in keychain.components().iter().enumerate() {
        match current {
            Node::Mapping(map) => match map.get(component) {
                Some(next) => current = next,
                None => {
                    return Err((
                        keychain.prefix(i),
                        format!("key '{component}' not found"),
                    ))
                }
            },
            _ => {
                return Err((
                    keychain.prefix(i),
                    format!("'{component}' does not traverse a mapping"),
                ))
            }
        }
    }
    Ok(current)
}

/// Reads the subtree at `keychain`.
pub fn get(root: &Node, keychain: &Keychain) -> KmResult {
    match traverse(root, keychain) {
        Ok(node) => KmResult::ok(keychain.clone(), node.clone()),
        Err((last_good, message)) => KmResult::err(last_good, message),
    }
}

/// Replaces the subtree at `keychain` with `new_value`. With `create`,
/// missing intermediate mappings are materialized; without it, `put` on a
/// path whose parent doesn't already exist fails. Fails, without mutating
/// `root`, if an intermediate component resolves to a non-mapping.
pub fn put(root: &mut Node, keychain: &Keychain, new_value: Node, create: bool) -> KmResult {
    if keychain.is_root() {
        *root = new_value.clone();
        return KmResult::ok(Keychain::root(), new_value);
    }

    if !root.is_mapping() {
        return KmResult::err(Keychain::root(), "root is not a mapping");
    }

    // Validate the path first so a failure never partially mutates root.
    {
        let mut cursor: &Node = root;
        for (i, component) in keychain.components()[..keychain.len() - 1].iter().enumerate() {
            match cursor {
                Node::Mapping(map) => match map.get(component) {
                    Some(next) => cursor = next,
                    None => {
                        if create {
                            continue;
                        }
                        return KmResult::err(
                            keychain.prefix(i),
                            format!("key '{component}' not found and create=false"),
                        );
                    }
                },
                _ => {
                    return KmResult::err(
                        keychain.prefix(i),
                        format!("'{component}' does not traverse a mapping"),
                    )
                }
            }
        }
    }

    let mut cursor = root;
    let last = keychain.len() - 1;
    for (i, component) in keychain.components()[..last].iter().enumerate() {
        let map = cursor.as_mapping_mut().expect("validated above");
        if !map.contains_key(component) {
            if !create {
                return KmResult::err(
                    keychain.prefix(i),
                    format!("key '{component}' not found and create=false"),
                );
            }
            map.insert(component.clone(), Node::mapping());
        }
        cursor = map.get_mut(component).expect("just inserted or present");
    }

    let map = match cursor.as_mapping_mut() {
        Some(m) => m,
        None => return KmResult::err(keychain.prefix(last), "parent is not a mapping"),
    };
    let last_component = &keychain.components()[last];
    map.insert(last_component.clone(), new_value.clone());

    KmResult::ok(keychain.clone(), new_value)
}

fn traverse_mut<'a>(
    root: &'a mut Node,
    components: &[String],
) -> Result<&'a mut Node, (usize, String)> {
    let mut current = root;
    for (i, component) in components.iter().enumerate() {
        current = match current {
            Node::Mapping(map) => match map.get_mut(component) {
                Some(next) => next,
                None => return Err((i, format!("key '{component}' not found"))),
            },
            _ => return Err((i, format!("'{component}' does not traverse a mapping"))),
        };
    }
    Ok(current)
}

/// Removes the leaf at `keychain`. Fails if the keychain does not resolve.
/// The root may not be deleted.
pub fn delete(root: &mut Node, keychain: &Keychain) -> KmResult {
    if keychain.is_root() {
        return KmResult::err(Keychain::root(), "cannot delete the root");
    }

    let get_result = get(root, keychain);
    if !get_result.ok {
        return get_result;
    }

    let last = keychain.len() - 1;
    let parent = match traverse_mut(root, &keychain.components()[..last]) {
        Ok(node) => node,
        Err((i, message)) => return KmResult::err(keychain.prefix(i), message),
    };
    let map = parent.as_mapping_mut().expect("validated by get() above");
    map.shift_remove(&keychain.components()[last]);

    get_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::Keychain;

    fn kc(s: &str) -> Keychain {
        Keychain::parse(s).unwrap()
    }

    #[test]
    fn get_put_round_trip() {
        let mut root = Node::mapping();
        let key = kc("a.b.c");
        let put_result = put(&mut root, &key, Node::scalar("42"), true);
        assert!(put_result.ok);

        let get_result = get(&root, &key);
        assert!(get_result.ok);
        assert_eq!(get_result.returned_node, Node::scalar("42"));
    }

    #[test]
    fn put_without_create_fails_on_missing_intermediate() {
        let mut root = Node::mapping();
        let result = put(&mut root, &kc("a.b.c"), Node::scalar("1"), false);
        assert!(!result.ok);
        assert!(result.last_good_key.is_root());
        assert_eq!(get(&root, &kc("a")).ok, false);
    }

    #[test]
    fn put_under_scalar_parent_fails() {
        let mut root = Node::mapping();
        put(&mut root, &kc("a"), Node::scalar("leaf"), true);
        let result = put(&mut root, &kc("a.b"), Node::scalar("x"), true);
        assert!(!result.ok);
    }

    #[test]
    fn delete_root_is_disallowed() {
        let mut root = Node::mapping();
        let result = delete(&mut root, &Keychain::root());
        assert!(!result.ok);
    }

    #[test]
    fn delete_reverses_put() {
        let mut root = Node::mapping();
        let key = kc("a.b");
        put(&mut root, &key, Node::scalar("v"), true);
        assert!(get(&root, &key).ok);

        let deleted = delete(&mut root, &key);
        assert!(deleted.ok);
        assert!(!get(&root, &key).ok);
    }

    #[test]
    fn delete_nonexistent_path_fails() {
        let mut root = Node::mapping();
        let result = delete(&mut root, &kc("missing"));
        assert!(!result.ok);
    }

    #[test]
    fn failed_put_does_not_mutate_root() {
        let mut root = Node::mapping();
        put(&mut root, &kc("a"), Node::scalar("present"), true);
        let before = root.clone();

        let result = put(&mut root, &kc("a.b"), Node::scalar("x"), true);
        assert!(!result.ok);
        assert_eq!(root, before);
    }

    #[test]
    fn last_good_key_is_longest_resolving_prefix() {
        let mut root = Node::mapping();
        put(&mut root, &kc("a.b"), Node::scalar("v"), true);

        let result = get(&root, &kc("a.b.c.d"));
        assert!(!result.ok);
        assert_eq!(result.last_good_key, kc("a.b"));
    }
}
