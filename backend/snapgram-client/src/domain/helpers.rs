//! Small pure helpers shared by the API adapter and the views

use chrono::{DateTime, Utc};

const INTERVALS: [(&str, i64); 7] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Tags typed as "a, b,c" become ["a", "b", "c"]
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .replace(' ', "")
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn check_is_liked(likes: &[String], user_id: &str) -> bool {
    likes.iter().any(|id| id == user_id)
}

/// Like-list after `user_id` toggles their like
///
/// The result holds `user_id` at most once.
pub fn toggle_like(likes: &[String], user_id: &str) -> Vec<String> {
    if check_is_liked(likes, user_id) {
        likes.iter().filter(|id| *id != user_id).cloned().collect()
    } else {
        let mut next = likes.to_vec();
        next.push(user_id.to_string());
        next
    }
}

/// Relative age such as "3 days ago"; future timestamps read "Just now"
pub fn time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - timestamp).num_seconds();

    for (label, seconds) in INTERVALS {
        let count = elapsed / seconds;
        if count >= 1 {
            let plural = if count != 1 { "s" } else { "" };
            return format!("{} {}{} ago", count, label, plural);
        }
    }
    "Just now".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("art, travel ,food"), ids(&["art", "travel", "food"]));
        assert_eq!(parse_tags("single"), ids(&["single"]));
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ").is_empty());
    }

    #[test]
    fn test_toggle_like_adds_then_removes() {
        let start = ids(&["u2"]);
        let liked = toggle_like(&start, "u1");
        assert_eq!(liked, ids(&["u2", "u1"]));
        assert!(check_is_liked(&liked, "u1"));

        let unliked = toggle_like(&liked, "u1");
        assert_eq!(unliked, start);
    }

    #[test]
    fn test_toggle_like_removes_duplicates() {
        let dirty = ids(&["u1", "u2", "u1"]);
        assert_eq!(toggle_like(&dirty, "u1"), ids(&["u2"]));
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "Just now");
        assert_eq!(time_ago(now + Duration::seconds(30), now), "Just now");
        assert_eq!(time_ago(now - Duration::seconds(1), now), "1 second ago");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(time_ago(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(time_ago(now - Duration::days(3), now), "3 days ago");
        assert_eq!(time_ago(now - Duration::days(14), now), "2 weeks ago");
        assert_eq!(time_ago(now - Duration::days(400), now), "1 year ago");
    }
}
