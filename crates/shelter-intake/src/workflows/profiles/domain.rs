use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for animal profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verified identity of the caller, handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Reviewer,
    Administrator,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "author" => Some(Self::Author),
            "reviewer" => Some(Self::Reviewer),
            "administrator" => Some(Self::Administrator),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Reviewer => "reviewer",
            Self::Administrator => "administrator",
        }
    }

    pub const fn can_review(self) -> bool {
        matches!(self, Self::Reviewer | Self::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId(id.into()),
            role,
        }
    }
}

/// Who performed a lifecycle step and when. `actor` is `None` for system steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStamp {
    pub actor: Option<ActorId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileStatus {
    Draft,
    Accepted,
    Rejected,
    Published,
}

impl ProfileStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Published => "PUBLISHED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "PUBLISHED" => Some(Self::Published),
            _ => None,
        }
    }
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External publishing platforms receiving the distribution fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Instagram,
    X,
    Mastodon,
}

impl Platform {
    pub const fn ordered() -> [Self; 4] {
        [Self::Facebook, Self::Instagram, Self::X, Self::Mastodon]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::X => "x",
            Self::Mastodon => "mastodon",
        }
    }
}

/// Outcomes of the publication jobs. Absent platform = never attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    #[serde(default)]
    pub platforms: BTreeMap<Platform, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_synced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_synced_at: Option<DateTime<Utc>>,
}

/// Fields that the translation job fills with machine-generated English text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characteristics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diseases: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handicaps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl TranslatedFields {
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (name, value) in [
            ("descShort", &self.desc_short),
            ("characteristics", &self.characteristics),
            ("compatibility", &self.compatibility),
            ("diseases", &self.diseases),
            ("handicaps", &self.handicaps),
            ("health", &self.health),
        ] {
            if value.is_some() {
                names.push(name);
            }
        }
        names
    }
}

/// Author-supplied content of a new profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub desc_short: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default)]
    pub characteristics: Option<String>,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub diseases: Option<String>,
    #[serde(default)]
    pub handicaps: Option<String>,
    #[serde(default)]
    pub health: Option<String>,
    /// `DD.MM.YYYY`
    #[serde(default)]
    pub birth_date: Option<String>,
    /// Shoulder height in centimetres, as entered.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub seeking_home_since: Option<String>,
}

/// The adoptable-animal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub category: String,
    pub desc_short: String,
    pub location: String,
    pub gallery: Vec<String>,
    pub characteristics: Option<String>,
    pub compatibility: Option<String>,
    pub diseases: Option<String>,
    pub handicaps: Option<String>,
    pub health: Option<String>,
    pub birth_date: Option<String>,
    pub size: Option<String>,
    pub seeking_home_since: Option<String>,
    pub status: ProfileStatus,
    pub created_by: ActorStamp,
    pub reviewed_by: Option<ActorStamp>,
    pub finalized_by: Option<ActorStamp>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub distribution: DistributionResult,
    #[serde(default)]
    pub translated: TranslatedFields,
    pub original_characteristics: Option<String>,
}

impl Profile {
    pub fn from_draft(
        id: ProfileId,
        draft: ProfileDraft,
        author: &ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        let ProfileDraft {
            name,
            category,
            desc_short,
            location,
            gallery,
            characteristics,
            compatibility,
            diseases,
            handicaps,
            health,
            birth_date,
            size,
            seeking_home_since,
        } = draft;

        Self {
            id,
            name,
            category,
            desc_short,
            location,
            gallery,
            characteristics,
            compatibility,
            diseases,
            handicaps,
            health,
            birth_date,
            size,
            seeking_home_since,
            status: ProfileStatus::Draft,
            created_by: ActorStamp {
                actor: Some(author.clone()),
                at: now,
            },
            reviewed_by: None,
            finalized_by: None,
            updated_at: now,
            distribution: DistributionResult::default(),
            translated: TranslatedFields::default(),
            original_characteristics: None,
        }
    }

    /// Applies a patch to its own field subset only.
    pub fn apply(&mut self, patch: ProfilePatch, now: DateTime<Utc>) {
        match patch {
            ProfilePatch::Status { status, stamp } => {
                match status {
                    ProfileStatus::Accepted | ProfileStatus::Rejected => {
                        self.reviewed_by = Some(stamp)
                    }
                    ProfileStatus::Published => self.finalized_by = Some(stamp),
                    ProfileStatus::Draft => {}
                }
                self.status = status;
            }
            ProfilePatch::Content(update) => update.apply_to(self),
            ProfilePatch::Translation {
                fields,
                original_characteristics,
            } => {
                self.translated = fields;
                if self.original_characteristics.is_none() {
                    self.original_characteristics = original_characteristics;
                }
            }
            ProfilePatch::Distribution {
                platforms,
                distributed_at,
            } => {
                self.distribution.platforms.extend(platforms);
                self.distribution.distributed_at = Some(distributed_at);
            }
            ProfilePatch::CatalogSync { synced, synced_at } => {
                self.distribution.catalog_synced = Some(synced);
                self.distribution.catalog_synced_at = Some(synced_at);
            }
        }
        self.updated_at = now;
    }

    /// Short summary kept in the audit trail when a profile is deleted.
    pub fn snapshot_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "category": self.category,
            "status": self.status.label(),
            "created_by": self.created_by.actor.as_ref().map(|actor| actor.0.clone()),
            "created_at": self.created_by.at,
            "gallery_count": self.gallery.len(),
        })
    }
}

/// Disjoint field updates. Every writer owns exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilePatch {
    Status {
        status: ProfileStatus,
        stamp: ActorStamp,
    },
    Content(ProfileUpdate),
    Translation {
        fields: TranslatedFields,
        original_characteristics: Option<String>,
    },
    Distribution {
        platforms: BTreeMap<Platform, bool>,
        distributed_at: DateTime<Utc>,
    },
    CatalogSync {
        synced: bool,
        synced_at: DateTime<Utc>,
    },
}

/// User-editable partial update. Status, reviewer and distribution fields
/// are deliberately not representable here. Optional fields distinguish an
/// absent key (keep) from an explicit `null` (clear).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub desc_short: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub gallery: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub characteristics: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub compatibility: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub diseases: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub handicaps: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub health: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub seeking_home_since: Option<Option<String>>,
}

impl ProfileUpdate {
    /// Names of the fields whose value would change on `profile`.
    pub fn changed_fields(&self, profile: &Profile) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut check = |name: &'static str, differs: bool| {
            if differs {
                changed.push(name);
            }
        };

        check("name", differs(&self.name, &profile.name));
        check("category", differs(&self.category, &profile.category));
        check("descShort", differs(&self.desc_short, &profile.desc_short));
        check("location", differs(&self.location, &profile.location));
        check(
            "gallery",
            self.gallery
                .as_ref()
                .is_some_and(|gallery| gallery != &profile.gallery),
        );
        check(
            "characteristics",
            differs_optional(&self.characteristics, &profile.characteristics),
        );
        check(
            "compatibility",
            differs_optional(&self.compatibility, &profile.compatibility),
        );
        check("diseases", differs_optional(&self.diseases, &profile.diseases));
        check(
            "handicaps",
            differs_optional(&self.handicaps, &profile.handicaps),
        );
        check("health", differs_optional(&self.health, &profile.health));
        check(
            "birthDate",
            differs_optional(&self.birth_date, &profile.birth_date),
        );
        check("size", differs_optional(&self.size, &profile.size));
        check(
            "seekingHomeSince",
            differs_optional(&self.seeking_home_since, &profile.seeking_home_since),
        );

        changed
    }

    fn apply_to(self, profile: &mut Profile) {
        if let Some(value) = self.name {
            profile.name = value;
        }
        if let Some(value) = self.category {
            profile.category = value;
        }
        if let Some(value) = self.desc_short {
            profile.desc_short = value;
        }
        if let Some(value) = self.location {
            profile.location = value;
        }
        if let Some(value) = self.gallery {
            profile.gallery = value;
        }
        for (target, value) in [
            (&mut profile.characteristics, self.characteristics),
            (&mut profile.compatibility, self.compatibility),
            (&mut profile.diseases, self.diseases),
            (&mut profile.handicaps, self.handicaps),
            (&mut profile.health, self.health),
            (&mut profile.birth_date, self.birth_date),
            (&mut profile.size, self.size),
            (&mut profile.seeking_home_since, self.seeking_home_since),
        ] {
            if let Some(value) = value {
                *target = value;
            }
        }
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn differs(update: &Option<String>, current: &str) -> bool {
    update.as_deref().is_some_and(|value| value != current)
}

fn differs_optional(update: &Option<Option<String>>, current: &Option<String>) -> bool {
    update.as_ref().is_some_and(|value| value != current)
}

/// Filters for listing profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileQuery {
    pub status: Option<ProfileStatus>,
    pub created_by: Option<ActorId>,
    pub limit: Option<usize>,
}

/// Public representation returned by the read operations.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: ProfileId,
    pub name: String,
    pub category: String,
    pub status: &'static str,
    pub location: String,
    pub gallery_count: usize,
    pub distribution: DistributionResult,
    pub translated_fields: Vec<&'static str>,
}

impl From<&Profile> for ProfileView {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            category: profile.category.clone(),
            status: profile.status.label(),
            location: profile.location.clone(),
            gallery_count: profile.gallery.len(),
            distribution: profile.distribution.clone(),
            translated_fields: profile.translated.field_names(),
        }
    }
}
