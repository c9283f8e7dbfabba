//! Change detection between the committed manifest and fresh fingerprints.
//!
//! [`diff`] is a pure function: no I/O, no clock. A changed record marks its
//! own route plus, depending on [`InvalidationPolicy`], the listing routes
//! that display it:
//!
//! | changed record | also marks                                             |
//! |----------------|--------------------------------------------------------|
//! | post           | its category / tag / author pages, `/` if within the home window |
//! | category, tag, author | nothing else                                    |
//! | any deletion   | `/`                                                    |

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use sitesync_core::routes::{record_path, HOME_PATH};
use sitesync_core::{ContentKind, ContentSnapshot, InvalidationPolicy, Slug};

use crate::hasher::FingerprintSet;
use crate::manifest::{Manifest, MANIFEST_VERSION};

/// Why a build must regenerate every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RebuildReason {
    NoManifest,
    VersionMismatch { found: u32, expected: u32 },
    TooManyChanges { count: usize, limit: usize },
    Forced,
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::NoManifest => f.write_str("no previous manifest"),
            RebuildReason::VersionMismatch { found, expected } => {
                write!(f, "manifest version {found} (expected {expected})")
            }
            RebuildReason::TooManyChanges { count, limit } => {
                write!(f, "{count} changed routes exceed the limit of {limit}")
            }
            RebuildReason::Forced => f.write_str("full rebuild requested"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    pub policy: InvalidationPolicy,
    /// More changed routes than this forces a full rebuild.
    pub max_changed_routes: usize,
}

impl DiffOptions {
    pub fn from_config(config: &sitesync_core::SiteConfig) -> Self {
        Self {
            policy: config.invalidation.clone(),
            max_changed_routes: config.max_changed_routes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub changed_routes: BTreeSet<String>,
    /// Pages of records that no longer exist upstream.
    pub deleted_routes: BTreeSet<String>,
    pub full_rebuild_required: bool,
    pub reason: Option<RebuildReason>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl ChangeSet {
    fn full(reason: RebuildReason) -> Self {
        Self {
            full_rebuild_required: true,
            reason: Some(reason),
            ..Self::default()
        }
    }

    /// Same diff, but every route is rebuilt. An earlier reason wins.
    pub fn forced(mut self) -> Self {
        self.full_rebuild_required = true;
        self.reason.get_or_insert(RebuildReason::Forced);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.full_rebuild_required
            && self.changed_routes.is_empty()
            && self.deleted_routes.is_empty()
    }
}

/// Compare `new` against the committed manifest.
pub fn diff(
    old: Option<&Manifest>,
    new: &FingerprintSet,
    snapshot: &ContentSnapshot,
    options: &DiffOptions,
) -> ChangeSet {
    let old = match old {
        None => return ChangeSet::full(RebuildReason::NoManifest),
        Some(m) if m.version != MANIFEST_VERSION => {
            return ChangeSet::full(RebuildReason::VersionMismatch {
                found: m.version,
                expected: MANIFEST_VERSION,
            })
        }
        Some(m) => &m.content_hashes,
    };

    let mut changes = ChangeSet::default();
    let home_window: BTreeSet<&Slug> = snapshot
        .recent_post_slugs(options.policy.home_window)
        .into_iter()
        .collect();

    for kind in ContentKind::all() {
        let before = old.get(*kind);
        let after = new.get(*kind);

        for (slug, fingerprint) in after {
            match before.get(slug) {
                Some(previous) if previous == fingerprint => continue,
                Some(_) => changes.modified += 1,
                None => changes.added += 1,
            }
            changes.changed_routes.insert(record_path(*kind, slug));
            if *kind == ContentKind::Post {
                mark_post_listings(&mut changes, slug, snapshot, &options.policy, &home_window);
            }
        }

        for slug in before.keys().filter(|slug| !after.contains_key(*slug)) {
            changes.deleted += 1;
            changes.deleted_routes.insert(record_path(*kind, slug));
            changes.changed_routes.insert(HOME_PATH.to_string());
        }
    }

    if changes.changed_routes.len() > options.max_changed_routes {
        changes.full_rebuild_required = true;
        changes.reason = Some(RebuildReason::TooManyChanges {
            count: changes.changed_routes.len(),
            limit: options.max_changed_routes,
        });
    }
    changes
}

fn mark_post_listings(
    changes: &mut ChangeSet,
    slug: &Slug,
    snapshot: &ContentSnapshot,
    policy: &InvalidationPolicy,
    home_window: &BTreeSet<&Slug>,
) {
    if home_window.contains(slug) {
        changes.changed_routes.insert(HOME_PATH.to_string());
    }
    let Some(post) = snapshot.find(ContentKind::Post, slug) else {
        return;
    };
    let relations = &post.relations;
    if policy.categories {
        for s in snapshot.slugs_for(ContentKind::Category, &relations.categories) {
            changes.changed_routes.insert(record_path(ContentKind::Category, s));
        }
    }
    if policy.tags {
        for s in snapshot.slugs_for(ContentKind::Tag, &relations.tags) {
            changes.changed_routes.insert(record_path(ContentKind::Tag, s));
        }
    }
    if policy.author {
        let author = relations.author.as_slice();
        for s in snapshot.slugs_for(ContentKind::Author, author) {
            changes.changed_routes.insert(record_path(ContentKind::Author, s));
        }
    }
}
