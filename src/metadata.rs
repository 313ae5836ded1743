//! Title and description composition for uploads.

use serde::{Deserialize, Serialize};

use crate::publication::{Privacy, VideoMetadata};
use crate::state_machine::Job;

/// Platform limit on title length, in characters.
const MAX_TITLE_CHARS: usize = 100;

/// Fixed template applied to every job's display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTemplate {
    #[serde(default = "default_title")]
    pub default_title: String,
    #[serde(default = "default_title_suffix")]
    pub title_suffix: String,
    #[serde(default = "default_description_footer")]
    pub description_footer: String,
    #[serde(default = "default_category_id")]
    pub category_id: String,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_title() -> String {
    "Auto Upload".to_string()
}

fn default_title_suffix() -> String {
    " #shorts".to_string()
}

fn default_description_footer() -> String {
    "Uploaded via Automation Bot".to_string()
}

// "Science & Technology".
fn default_category_id() -> String {
    "28".to_string()
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            title_suffix: default_title_suffix(),
            description_footer: default_description_footer(),
            category_id: default_category_id(),
            privacy: Privacy::default(),
            tags: Vec::new(),
        }
    }
}

impl MetadataTemplate {
    pub fn compose(&self, job: &Job) -> VideoMetadata {
        VideoMetadata {
            title: self.title_for(job),
            description: self.description_for(job),
            category_id: self.category_id.clone(),
            privacy: self.privacy,
            tags: self.tags.clone(),
        }
    }

    /// Job title (or the default) plus suffix, cut so the suffix always survives.
    fn title_for(&self, job: &Job) -> String {
        let base = job
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.default_title);
        let base = strip_angle_brackets(base);
        let suffix = strip_angle_brackets(&self.title_suffix);

        let room = MAX_TITLE_CHARS.saturating_sub(suffix.chars().count());
        let mut title: String = base.chars().take(room).collect();
        title.push_str(&suffix);
        title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string()
    }

    fn description_for(&self, job: &Job) -> String {
        let mut parts = Vec::new();
        if let Some(seed) = job.description_seed.as_deref().map(str::trim)
            && !seed.is_empty()
        {
            parts.push(seed.to_string());
        }
        parts.push(format!("{}\n{}", self.description_footer, job.source_reference));
        parts.join("\n\n")
    }
}

// Titles containing '<' or '>' are rejected by the platform.
fn strip_angle_brackets(s: &str) -> String {
    s.chars().filter(|c| *c != '<' && *c != '>').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::NewJob;

    fn job(new: NewJob) -> Job {
        Job::from_new(new, 1)
    }

    #[test]
    fn default_title_and_description() {
        let template = MetadataTemplate::default();
        let meta = template.compose(&job(NewJob::new("https://youtu.be/abc")));

        assert_eq!(meta.title, "Auto Upload #shorts");
        assert_eq!(meta.description, "Uploaded via Automation Bot\nhttps://youtu.be/abc");
        assert_eq!(meta.category_id, "28");
        assert_eq!(meta.privacy, Privacy::Public);
    }

    #[test]
    fn job_title_and_seed_are_used() {
        let template = MetadataTemplate::default();
        let meta = template.compose(&job(
            NewJob::new("https://youtu.be/abc")
                .with_title("  Cat <3 fails ")
                .with_description("Best of the week"),
        ));

        assert_eq!(meta.title, "Cat 3 fails #shorts");
        assert_eq!(
            meta.description,
            "Best of the week\n\nUploaded via Automation Bot\nhttps://youtu.be/abc"
        );
    }

    #[test]
    fn long_titles_keep_suffix_within_limit() {
        let template = MetadataTemplate::default();
        let long = "ä".repeat(150);
        let meta = template.compose(&job(NewJob::new("u").with_title(long)));

        assert_eq!(meta.title.chars().count(), MAX_TITLE_CHARS);
        assert!(meta.title.ends_with(" #shorts"));
    }

    #[test]
    fn blank_title_falls_back_to_default() {
        let template = MetadataTemplate {
            default_title: "Clip".into(),
            title_suffix: String::new(),
            ..MetadataTemplate::default()
        };
        let meta = template.compose(&job(NewJob::new("u").with_title("   ")));
        assert_eq!(meta.title, "Clip");
    }
}
