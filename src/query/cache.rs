//! Per-query message cache.

use std::collections::HashMap;
use std::rc::Rc;

use crate::model::message::Message;

/// Messages pulled from the source, in pull order, unique by uid.
#[derive(Debug, Default)]
pub struct MessageCache {
    messages: Vec<Rc<Message>>,
    by_uid: HashMap<String, usize>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message; if the uid is already cached the existing entry wins.
    pub fn insert(&mut self, message: Message) -> Rc<Message> {
        if let Some(&idx) = self.by_uid.get(message.uid()) {
            return Rc::clone(&self.messages[idx]);
        }
        let message = Rc::new(message);
        self.by_uid
            .insert(message.uid().to_string(), self.messages.len());
        self.messages.push(Rc::clone(&message));
        message
    }

    pub fn get(&self, uid: &str) -> Option<Rc<Message>> {
        self.by_uid.get(uid).map(|&i| Rc::clone(&self.messages[i]))
    }

    pub fn get_index(&self, index: usize) -> Option<Rc<Message>> {
        self.messages.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn uids(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.uid().to_string()).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.by_uid.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(uid: &str, subject: &str) -> Message {
        Message::from_raw(uid, format!("Subject: {subject}\n\nx\n").into_bytes())
    }

    #[test]
    fn test_insert_dedups_by_uid() {
        let mut cache = MessageCache::new();
        cache.insert(msg("1", "first"));
        let again = cache.insert(msg("1", "second"));
        assert_eq!(again.subject(), "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_order_and_lookup() {
        let mut cache = MessageCache::new();
        cache.insert(msg("b", "B"));
        cache.insert(msg("a", "A"));
        assert_eq!(cache.uids(), ["b", "a"]);
        assert_eq!(cache.get("a").unwrap().subject(), "A");
        assert_eq!(cache.get_index(0).unwrap().uid(), "b");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}
