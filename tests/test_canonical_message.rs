//! Property tests for the canonical submission message
//!
//! The message must not depend on the order in which tags or secondary
//! interfaces were entered, and every signed field must be recoverable from
//! the `v1` encoding. Changing any single signed field must change it.

use agent_registry::model::{AccessPolicy, InterfaceKind};
use agent_registry::signing::{AgentSubmission, CanonicalMessage, MessageVersion, SecondaryInterface};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use proptest::prelude::*;

fn kind() -> impl Strategy<Value = Option<InterfaceKind>> {
    prop::option::of(prop_oneof![Just(InterfaceKind::Api), Just(InterfaceKind::WebUi)])
}

fn access() -> impl Strategy<Value = Option<AccessPolicy>> {
    prop::option::of(prop_oneof![
        Just(AccessPolicy::Public),
        Just(AccessPolicy::KeyRequired)
    ])
}

fn secondary() -> impl Strategy<Value = SecondaryInterface> {
    (kind(), "[a-z:/.]{0,12}", access(), "[a-z]{0,6}", "[A-Za-z ]{0,8}", ".{0,10}").prop_map(
        |(kind, url, access, key_request_url, display_name, notes)| SecondaryInterface {
            kind,
            url,
            access,
            key_request_url,
            display_name,
            notes,
        },
    )
}

fn submission(secondary: Vec<SecondaryInterface>, tag_slugs: Vec<String>) -> impl Strategy<Value = AgentSubmission> {
    (
        "[a-z-]{0,12}",
        ".{0,16}",
        ".{0,24}",
        kind(),
        access(),
        "[A-Za-z0-9]{32,44}",
        "[a-z0-9]{1,12}",
    )
        .prop_map(move |(slug, name, summary, primary_kind, primary_access, owner, nonce)| AgentSubmission {
            slug,
            name,
            summary,
            primary_kind,
            primary_url: "https://agent.example.com/api".to_string(),
            primary_access,
            secondary: secondary.clone(),
            tag_slugs: tag_slugs.clone(),
            owner_wallet: owner,
            nonce,
            timestamp: "2025-03-01T12:00:00.000Z".to_string(),
            ..Default::default()
        })
}

fn shuffled_pair<T: Clone + std::fmt::Debug>(
    items: impl Strategy<Value = Vec<T>>,
) -> impl Strategy<Value = (Vec<T>, Vec<T>)> {
    items.prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
}

fn decode(line: &str) -> String {
    String::from_utf8(STANDARD.decode(line).unwrap()).unwrap()
}

const SIGNED_FIELDS: [&str; 20] = [
    "slug",
    "name",
    "summary",
    "thumbnail_url",
    "website_url",
    "primary_kind",
    "primary_url",
    "primary_access",
    "key_request_url",
    "owner_wallet",
    "agent_wallet",
    "donation_wallet",
    "nonce",
    "timestamp",
    "secondary.kind",
    "secondary.url",
    "secondary.access",
    "secondary.key_request_url",
    "secondary.display_name",
    "secondary.notes",
];

fn flip_kind(kind: &mut Option<InterfaceKind>) {
    *kind = match kind {
        Some(InterfaceKind::Api) => Some(InterfaceKind::WebUi),
        _ => Some(InterfaceKind::Api),
    };
}

fn flip_access(access: &mut Option<AccessPolicy>) {
    *access = match access {
        Some(AccessPolicy::Public) => Some(AccessPolicy::KeyRequired),
        _ => Some(AccessPolicy::Public),
    };
}

/// Alter one signed field: text grows by `suffix`, enums switch variant
fn change_field(s: &mut AgentSubmission, field: &str, suffix: &str) {
    let secondary = &mut s.secondary[0];
    match field {
        "slug" => s.slug.push_str(suffix),
        "name" => s.name.push_str(suffix),
        "summary" => s.summary.push_str(suffix),
        "thumbnail_url" => s.thumbnail_url.push_str(suffix),
        "website_url" => s.website_url.push_str(suffix),
        "primary_kind" => flip_kind(&mut s.primary_kind),
        "primary_url" => s.primary_url.push_str(suffix),
        "primary_access" => flip_access(&mut s.primary_access),
        "key_request_url" => s.key_request_url.push_str(suffix),
        "owner_wallet" => s.owner_wallet.push_str(suffix),
        "agent_wallet" => s.agent_wallet.push_str(suffix),
        "donation_wallet" => s.donation_wallet.push_str(suffix),
        "nonce" => s.nonce.push_str(suffix),
        "timestamp" => s.timestamp.push_str(suffix),
        "secondary.kind" => flip_kind(&mut secondary.kind),
        "secondary.url" => secondary.url.push_str(suffix),
        "secondary.access" => flip_access(&mut secondary.access),
        "secondary.key_request_url" => secondary.key_request_url.push_str(suffix),
        "secondary.display_name" => secondary.display_name.push_str(suffix),
        "secondary.notes" => secondary.notes.push_str(suffix),
        other => panic!("unknown field {other}"),
    }
}

/// API primary with an explicit policy and one secondary, so no field is normalised away
fn populated_submission() -> impl Strategy<Value = AgentSubmission> {
    (
        prop::collection::vec(".{0,10}", 13),
        secondary(),
        access(),
    )
        .prop_map(|(text, secondary, primary_access)| AgentSubmission {
            slug: text[0].clone(),
            name: text[1].clone(),
            summary: text[2].clone(),
            thumbnail_url: text[3].clone(),
            website_url: text[4].clone(),
            primary_kind: Some(InterfaceKind::Api),
            primary_url: text[5].clone(),
            primary_access: primary_access.or(Some(AccessPolicy::Public)),
            key_request_url: text[6].clone(),
            secondary: vec![secondary],
            tag_slugs: vec![text[7].clone()],
            owner_wallet: text[8].clone(),
            agent_wallet: text[9].clone(),
            donation_wallet: text[10].clone(),
            nonce: text[11].clone(),
            timestamp: text[12].clone(),
        })
}

proptest! {
    #[test]
    fn prop_message_ignores_entry_order(
        (secondary, secondary_shuffled) in shuffled_pair(prop::collection::vec(secondary(), 0..5)),
        (tags, tags_shuffled) in shuffled_pair(prop::collection::vec("[a-z]{1,8}", 0..5)),
    ) {
        let base = AgentSubmission {
            slug: "agent".to_string(),
            secondary: secondary.clone(),
            tag_slugs: tags.clone(),
            ..Default::default()
        };
        let reordered = AgentSubmission {
            secondary: secondary_shuffled,
            tag_slugs: tags_shuffled,
            ..base.clone()
        };

        for version in [MessageVersion::V1, MessageVersion::V1Text] {
            prop_assert_eq!(
                CanonicalMessage::encode(&base, version),
                CanonicalMessage::encode(&reordered, version)
            );
        }
    }

    #[test]
    fn prop_v1_line_count_and_fields(
        s in (prop::collection::vec(secondary(), 0..4), prop::collection::vec("[a-z]{1,8}", 0..4))
            .prop_flat_map(|(secondary, tags)| submission(secondary, tags))
    ) {
        let message = CanonicalMessage::encode(&s, MessageVersion::V1);
        let lines: Vec<&str> = message.as_str().split('\n').collect();

        let secondary_lines = s.secondary.len().max(1);
        let tag_lines = s.tag_slugs.len().max(1);
        prop_assert_eq!(lines.len(), 15 + secondary_lines + tag_lines);

        prop_assert_eq!(lines[0], "v1");
        prop_assert_eq!(decode(lines[1]), s.slug.clone());
        prop_assert_eq!(decode(lines[2]), s.name.clone());
        prop_assert_eq!(decode(lines[3]), s.summary.clone());

        let tail = &lines[lines.len() - 5..];
        prop_assert_eq!(decode(tail[0]), s.owner_wallet.clone());
        prop_assert_eq!(decode(tail[3]), s.nonce.clone());
        prop_assert_eq!(decode(tail[4]), s.timestamp.clone());

        for line in &lines[10..10 + secondary_lines] {
            if !s.secondary.is_empty() {
                prop_assert_eq!(line.split('|').count(), 6);
            }
        }
    }

    #[test]
    fn prop_every_signed_field_changes_message(
        s in populated_submission(),
        suffix in "[a-z0-9]{1,6}",
    ) {
        for field in SIGNED_FIELDS {
            let mut changed = s.clone();
            change_field(&mut changed, field, &suffix);
            for version in [MessageVersion::V1, MessageVersion::V1Text] {
                prop_assert_ne!(
                    CanonicalMessage::encode(&s, version),
                    CanonicalMessage::encode(&changed, version),
                    "changing {} left the {} message unchanged",
                    field,
                    version
                );
            }
        }
    }

    #[test]
    fn prop_primary_access_only_signed_for_api(
        s in submission(Vec::new(), Vec::new()),
    ) {
        let message = CanonicalMessage::encode(&s, MessageVersion::V1);
        let lines: Vec<&str> = message.as_str().split('\n').collect();
        let signed_access = decode(lines[8]);

        match s.primary_kind {
            Some(InterfaceKind::Api) => {
                let expected = s.primary_access.unwrap_or(AccessPolicy::Public);
                prop_assert_eq!(signed_access, expected.as_str());
            }
            _ => {
                prop_assert_eq!(signed_access, "");
                prop_assert_eq!(decode(lines[9]), "");
            }
        }
    }
}

#[test]
fn test_detected_version_matches_encoder() {
    let s = AgentSubmission {
        slug: "agent".to_string(),
        ..Default::default()
    };
    for version in [MessageVersion::V1, MessageVersion::V1Text] {
        let message = CanonicalMessage::encode(&s, version);
        assert_eq!(MessageVersion::detect(message.as_str()), Some(version));
        assert_eq!(message.version(), version);
    }
}
