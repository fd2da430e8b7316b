//! Keyword dispatch for inbound detection summaries.

pub const DEFAULT_KEYWORDS: [&str; 4] = ["person", "car", "cat", "bird"];

type Action = Box<dyn FnMut(&str)>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The action for this keyword ran.
    Matched(String),
    Unmatched,
    /// The payload was not UTF-8.
    Dropped,
}

/// Ordered (keyword, action) table. Matching is case-insensitive substring
/// containment and the first matching keyword wins.
pub struct MessageRouter {
    routes: Vec<(String, Action)>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// One logging action per keyword, in the given order.
    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keywords.into_iter().fold(Self::new(), |router, keyword| {
            let keyword = keyword.into();
            let label = keyword.clone();
            router.with_route(keyword, move |_| log::info!("{} detected! Taking action...", label))
        })
    }

    pub fn with_route(mut self, keyword: impl Into<String>, action: impl FnMut(&str) + 'static) -> Self {
        self.routes
            .push((keyword.into().to_lowercase(), Box::new(action)));
        self
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(k, _)| k.as_str())
    }

    pub fn route(&mut self, payload: &[u8]) -> RouteOutcome {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Dropping undecodable message: {}", e);
                return RouteOutcome::Dropped;
            }
        };
        log::info!("Object detection result: {}", text);

        let lowered = text.to_lowercase();
        for (keyword, action) in self.routes.iter_mut() {
            if lowered.contains(keyword.as_str()) {
                action(text);
                return RouteOutcome::Matched(keyword.clone());
            }
        }
        RouteOutcome::Unmatched
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::from_keywords(DEFAULT_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording(keywords: &[&str]) -> (MessageRouter, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let router = keywords.iter().fold(MessageRouter::new(), |router, kw| {
            let log = log.clone();
            let kw_owned = kw.to_string();
            router.with_route(*kw, move |_| log.borrow_mut().push(kw_owned.clone()))
        });
        (router, log)
    }

    #[test]
    fn person_triggers_once_case_insensitive() {
        let (mut router, calls) = recording(&DEFAULT_KEYWORDS);
        let outcome = router.route(b"Person detected");
        assert_eq!(outcome, RouteOutcome::Matched("person".to_string()));
        assert_eq!(*calls.borrow(), vec!["person"]);
    }

    #[test]
    fn first_keyword_in_table_order_wins() {
        let (mut router, calls) = recording(&DEFAULT_KEYWORDS);
        router.route(b"Detected: car, person");
        assert_eq!(*calls.borrow(), vec!["person"]);
    }

    #[test]
    fn substring_containment_matches_inside_words() {
        // "cat" is contained in "location".
        let (mut router, calls) = recording(&["cat"]);
        assert_eq!(
            router.route(b"location update"),
            RouteOutcome::Matched("cat".to_string())
        );
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn unmatched_runs_nothing() {
        let (mut router, calls) = recording(&DEFAULT_KEYWORDS);
        assert_eq!(router.route(b"Detected: truck"), RouteOutcome::Unmatched);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let (mut router, calls) = recording(&DEFAULT_KEYWORDS);
        assert_eq!(router.route(&[0xff, 0xfe, b'p']), RouteOutcome::Dropped);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn keywords_are_normalized_to_lowercase() {
        let router = MessageRouter::from_keywords(["Dog", "BIRD"]);
        assert_eq!(router.keywords().collect::<Vec<_>>(), vec!["dog", "bird"]);
    }

    #[test]
    fn default_table_order() {
        let router = MessageRouter::default();
        assert_eq!(
            router.keywords().collect::<Vec<_>>(),
            vec!["person", "car", "cat", "bird"]
        );
    }
}
