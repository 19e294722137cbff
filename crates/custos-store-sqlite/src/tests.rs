//! Integration tests for `SqliteStore` against an in-memory database.

use custos_core::{
  Classify, ErrorKind,
  entity::{EntityKind, EntityRef},
  party::PartyId,
  payload::{ObservationPayload, Patch, Payload},
  principal::Principal,
  store::{CatalogStore, Record},
};
use custos_policy::{PolicyConfig, PolicyEngine};
use serde_json::{Value, json};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(PolicyEngine::default())
    .await
    .expect("in-memory store")
}

fn alice() -> Option<Principal> { Some(Principal::new("alice")) }

fn bob() -> Option<Principal> { Some(Principal::new("bob")) }

fn root() -> Option<Principal> { Some(Principal::admin("root")) }

fn party_of(identity: &str) -> PartyId { PartyId::from_auth_id(identity) }

fn payload(kind: EntityKind, value: Value) -> Payload {
  Payload::from_json(kind, value).expect("valid payload")
}

fn inline_alice() -> Value { json!({ "authId": "alice", "displayName": "Alice" }) }

async fn create(
  s: &SqliteStore,
  principal: Option<Principal>,
  kind: EntityKind,
  value: Value,
) -> Result<Record, Error> {
  s.create(principal, payload(kind, value)).await
}

async fn update(
  s: &SqliteStore,
  principal: Option<Principal>,
  kind: EntityKind,
  id: &str,
  value: Value,
) -> Result<Record, Error> {
  let patch = Patch::from_json(kind, value).expect("valid patch");
  s.update(principal, id.to_owned(), patch).await
}

// ─── Licences ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn predefined_licences_are_seeded_once() {
  let s = store().await;
  assert_eq!(s.count(EntityKind::License).await.unwrap(), 7);

  let by = s.get(EntityKind::License, "CC_BY".into()).await.unwrap().unwrap();
  assert_eq!(by.body["definition"], "https://creativecommons.org/licenses/by/4.0/");
  assert_eq!(by.license.as_deref(), Some("CC_BY"));
}

#[tokio::test]
async fn predefined_licences_are_frozen_even_for_admins() {
  let s = store().await;

  let err = create(&s, root(), EntityKind::License, json!({ "id": "CC_BY", "name": "mine" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let err = s.delete(root(), EntityKind::License, "CC_PD".into()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  create(&s, alice(), EntityKind::License, json!({ "id": "ACME-1", "name": "Acme" }))
    .await
    .unwrap();
  assert_eq!(s.count(EntityKind::License).await.unwrap(), 8);

  let err = create(&s, alice(), EntityKind::License, json!({ "id": "ACME-1", "name": "Again" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn custom_licences_need_an_authenticated_caller() {
  let s = store().await;
  create(&s, alice(), EntityKind::License, json!({ "id": "ACME-1", "name": "Acme" }))
    .await
    .unwrap();

  let err = update(&s, None, EntityKind::License, "ACME-1", json!({ "name": "hijacked" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unauthenticated);

  let err = s.delete(None, EntityKind::License, "ACME-1".into()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unauthenticated);

  let acme = s.get(EntityKind::License, "ACME-1".into()).await.unwrap().unwrap();
  assert_eq!(acme.body["name"], "Acme");
}

#[tokio::test]
async fn dangling_licence_reference_is_invalid() {
  let s = store().await;
  let err = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "t", "license": { "id": "NOPE" } }),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, Error::DanglingReference { kind: EntityKind::License, .. }));
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// ─── Parties and ownership ───────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_create_is_rejected_and_nothing_is_written() {
  let s = store().await;
  let err = create(&s, None, EntityKind::Thing, json!({ "name": "station" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Unauthenticated);
  assert_eq!(s.count(EntityKind::Thing).await.unwrap(), 0);
}

#[tokio::test]
async fn new_thing_is_linked_to_the_caller() {
  let s = store().await;
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "station" }))
    .await
    .unwrap();

  assert_eq!(thing.party, Some(party_of("alice")));
  assert_eq!(thing.body, json!({ "name": "station" }));
  assert_eq!(s.count(EntityKind::Party).await.unwrap(), 1);
}

#[tokio::test]
async fn admin_create_without_owner_stays_unlinked() {
  let s = store().await;
  let thing = create(&s, root(), EntityKind::Thing, json!({ "name": "orphan" }))
    .await
    .unwrap();
  assert_eq!(thing.party, None);

  // Nobody but an admin can touch it afterwards.
  let err = update(&s, alice(), EntityKind::Thing, &thing.id, json!({ "name": "mine" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn owner_must_represent_the_caller() {
  let s = store().await;
  let err = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "t", "party": { "authId": "bob" } }),
  )
  .await
  .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn repeated_party_create_returns_the_existing_party() {
  let s = store().await;
  let first = create(&s, alice(), EntityKind::Party, inline_alice()).await.unwrap();
  assert_eq!(first.id, party_of("alice").to_string());

  let again = create(
    &s,
    alice(),
    EntityKind::Party,
    json!({ "authId": "alice", "displayName": "Someone else" }),
  )
  .await
  .unwrap();
  assert_eq!(again.id, first.id);
  assert_eq!(again.body["displayName"], "Alice");

  let overwritten = create(
    &s,
    root(),
    EntityKind::Party,
    json!({ "authId": "alice", "displayName": "Renamed" }),
  )
  .await
  .unwrap();
  assert_eq!(overwritten.body["displayName"], "Renamed");
  assert_eq!(s.count(EntityKind::Party).await.unwrap(), 1);
}

#[tokio::test]
async fn party_cannot_be_created_for_someone_else() {
  let s = store().await;
  let err = create(&s, alice(), EntityKind::Party, json!({ "authId": "bob" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn only_the_owner_updates_and_patches_merge() {
  let s = store().await;
  let ds = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "temp", "description": "outdoor" }),
  )
  .await
  .unwrap();

  let patched = update(&s, alice(), EntityKind::Datastream, &ds.id, json!({ "name": "temperature" }))
    .await
    .unwrap();
  assert_eq!(patched.body, json!({ "name": "temperature", "description": "outdoor" }));
  assert_eq!(patched.party, Some(party_of("alice")));

  let err = update(&s, bob(), EntityKind::Datastream, &ds.id, json!({ "name": "stolen" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  update(&s, root(), EntityKind::Datastream, &ds.id, json!({ "name": "fixed" }))
    .await
    .unwrap();
}

#[tokio::test]
async fn null_clears_an_attribute() {
  let s = store().await;
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "t", "description": "d" }))
    .await
    .unwrap();

  let patched = update(&s, alice(), EntityKind::Thing, &thing.id, json!({ "description": null }))
    .await
    .unwrap();
  assert_eq!(patched.body, json!({ "name": "t" }));
  assert_eq!(patched.party, Some(party_of("alice")));
}

#[tokio::test]
async fn admin_rekeys_a_party_and_its_entities_follow() {
  let s = store().await;
  create(&s, bob(), EntityKind::Party, json!({ "authId": "bob" })).await.unwrap();
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "t" })).await.unwrap();
  let alice_id = party_of("alice").to_string();

  let err = update(&s, alice(), EntityKind::Party, &alice_id, json!({ "authId": "alice2" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let err = update(&s, root(), EntityKind::Party, &alice_id, json!({ "authId": "bob" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  let moved = update(&s, root(), EntityKind::Party, &alice_id, json!({ "authId": "alice2" }))
    .await
    .unwrap();
  assert_eq!(moved.id, party_of("alice2").to_string());
  assert_eq!(moved.body["authId"], "alice2");
  assert!(s.get(EntityKind::Party, alice_id).await.unwrap().is_none());

  let thing = s.get(EntityKind::Thing, thing.id).await.unwrap().unwrap();
  assert_eq!(thing.party, Some(party_of("alice2")));
}

#[tokio::test]
async fn transfer_is_refused_unless_enabled() {
  let s = store().await;
  create(&s, bob(), EntityKind::Party, json!({ "authId": "bob" })).await.unwrap();
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "t" })).await.unwrap();
  let to_bob = json!({ "party": { "id": party_of("bob").to_string() } });

  let err = update(&s, alice(), EntityKind::Thing, &thing.id, to_bob.clone()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let cfg = PolicyConfig { transfer_ownership_enabled: true, ..PolicyConfig::default() };
  let s = SqliteStore::open_in_memory(PolicyEngine::new(cfg)).await.unwrap();
  create(&s, bob(), EntityKind::Party, json!({ "authId": "bob" })).await.unwrap();
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "t" })).await.unwrap();
  let moved = update(&s, alice(), EntityKind::Thing, &thing.id, to_bob).await.unwrap();
  assert_eq!(moved.party, Some(party_of("bob")));
}

#[tokio::test]
async fn groups_and_campaigns_need_an_owner() {
  let s = store().await;
  let err = create(&s, alice(), EntityKind::ObservationGroup, json!({ "name": "g" }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);

  let group = create(
    &s,
    alice(),
    EntityKind::ObservationGroup,
    json!({ "name": "g", "party": inline_alice() }),
  )
  .await
  .unwrap();
  assert_eq!(group.party, Some(party_of("alice")));
}

#[tokio::test]
async fn missing_entity_update_is_not_found() {
  let s = store().await;
  let err = update(
    &s,
    alice(),
    EntityKind::Thing,
    "5b0f9c0e-1111-4c4c-9d9d-000000000000",
    json!({ "name": "x" }),
  )
  .await
  .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Derived ownership and deletion ──────────────────────────────────────────

#[tokio::test]
async fn observations_follow_their_stream() {
  let s = store().await;
  let ds = create(&s, alice(), EntityKind::Datastream, json!({ "name": "t" })).await.unwrap();
  let obs = create(
    &s,
    bob(),
    EntityKind::Observation,
    json!({ "result": 21.5, "datastream": ds.id }),
  )
  .await
  .unwrap();
  assert_eq!(obs.parent, Some(EntityRef::new(EntityKind::Datastream, ds.id.clone())));

  let err = s.delete(bob(), EntityKind::Observation, obs.id.clone()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = s.delete(bob(), EntityKind::Datastream, ds.id.clone()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  s.delete(alice(), EntityKind::Datastream, ds.id.clone()).await.unwrap();
  assert!(s.get(EntityKind::Observation, obs.id).await.unwrap().is_none());
}

#[tokio::test]
async fn observation_needs_exactly_one_stream() {
  let s = store().await;
  let err = create(&s, alice(), EntityKind::Observation, json!({ "result": 1 }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);

  let ds = create(&s, alice(), EntityKind::Datastream, json!({ "name": "t" })).await.unwrap();
  let mds = create(&s, alice(), EntityKind::MultiDatastream, json!({ "name": "m" }))
    .await
    .unwrap();
  let both = Payload::Observation(ObservationPayload {
    datastream: Some(ds.id.parse().unwrap()),
    multi_datastream: Some(mds.id.parse().unwrap()),
    ..Default::default()
  });
  let err = s.create(alice(), both).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  assert_eq!(s.count(EntityKind::Observation).await.unwrap(), 0);
}

#[tokio::test]
async fn relations_need_the_subject_owner() {
  let s = store().await;
  let ds = create(&s, alice(), EntityKind::Datastream, json!({ "name": "t" })).await.unwrap();
  let obs = create(&s, alice(), EntityKind::Observation, json!({ "datastream": ds.id }))
    .await
    .unwrap();

  let err = create(&s, bob(), EntityKind::Relation, json!({ "role": "r", "subject": obs.id }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let rel = create(&s, alice(), EntityKind::Relation, json!({ "role": "r", "subject": obs.id }))
    .await
    .unwrap();
  assert_eq!(rel.parent, Some(EntityRef::new(EntityKind::Observation, obs.id)));
}

#[tokio::test]
async fn only_admins_delete_parties() {
  let s = store().await;
  let thing = create(&s, alice(), EntityKind::Thing, json!({ "name": "t" })).await.unwrap();
  let alice_id = party_of("alice").to_string();

  let err = s.delete(alice(), EntityKind::Party, alice_id.clone()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  s.delete(root(), EntityKind::Party, alice_id).await.unwrap();
  let thing = s.get(EntityKind::Thing, thing.id).await.unwrap().unwrap();
  assert_eq!(thing.party, None);
}

// ─── Licence compatibility ───────────────────────────────────────────────────

#[tokio::test]
async fn incompatible_group_rolls_back_the_whole_create() {
  let s = store().await;
  let nd = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "nd", "license": { "id": "CC_BY_ND" } }),
  )
  .await
  .unwrap();
  let pd = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "pd", "license": { "id": "CC_PD" } }),
  )
  .await
  .unwrap();
  let observation = |stream: &str| {
    json!({
      "result": 3,
      "datastream": stream,
      "groups": [{ "name": "g", "license": { "id": "CC_BY" }, "party": inline_alice() }],
    })
  };

  let err = create(&s, alice(), EntityKind::Observation, observation(&nd.id))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  assert!(err.to_string().contains("CC_BY_ND"), "{err}");
  assert_eq!(s.count(EntityKind::ObservationGroup).await.unwrap(), 0);
  assert_eq!(s.count(EntityKind::Observation).await.unwrap(), 0);

  let obs = create(&s, alice(), EntityKind::Observation, observation(&pd.id))
    .await
    .unwrap();
  assert_eq!(obs.links.len(), 1);
  assert_eq!(obs.links[0].kind, EntityKind::ObservationGroup);
  assert_eq!(obs.body, json!({ "result": 3 }));
}

#[tokio::test]
async fn campaign_memberships_are_linked_and_checked() {
  let s = store().await;
  let by = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "by", "license": { "id": "CC_BY" } }),
  )
  .await
  .unwrap();
  let nd = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "nd", "license": { "id": "CC_BY_ND" } }),
  )
  .await
  .unwrap();

  let campaign = create(
    &s,
    alice(),
    EntityKind::Campaign,
    json!({
      "name": "c",
      "party": inline_alice(),
      "license": { "id": "CC_BY_SA" },
      "datastreams": [by.id],
    }),
  )
  .await
  .unwrap();
  assert_eq!(campaign.links, vec![EntityRef::new(EntityKind::Datastream, by.id.clone())]);

  let by = s.get(EntityKind::Datastream, by.id).await.unwrap().unwrap();
  assert_eq!(by.links, vec![EntityRef::new(EntityKind::Campaign, campaign.id.clone())]);

  let err = update(
    &s,
    alice(),
    EntityKind::Datastream,
    &nd.id,
    json!({ "campaigns": [campaign.id] }),
  )
  .await
  .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn permissive_engine_skips_every_check() {
  let s = SqliteStore::open_in_memory(PolicyEngine::new(PolicyConfig::permissive()))
    .await
    .unwrap();
  let thing = create(&s, None, EntityKind::Thing, json!({ "name": "open" })).await.unwrap();
  assert_eq!(thing.party, None);
  create(&s, None, EntityKind::License, json!({ "id": "CC_BY", "name": "x" }))
    .await
    .unwrap_err();
}

#[tokio::test]
async fn relicensing_is_checked_against_existing_memberships() {
  let s = store().await;
  let pd = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "pd", "license": { "id": "CC_PD" } }),
  )
  .await
  .unwrap();
  let campaign = create(
    &s,
    alice(),
    EntityKind::Campaign,
    json!({
      "name": "c",
      "party": inline_alice(),
      "license": { "id": "CC_BY" },
      "datastreams": [pd.id],
    }),
  )
  .await
  .unwrap();

  let err = update(&s, alice(), EntityKind::Datastream, &pd.id, json!({ "license": { "id": "CC_BY_ND" } }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  let pd = s.get(EntityKind::Datastream, pd.id).await.unwrap().unwrap();
  assert_eq!(pd.license.as_deref(), Some("CC_PD"));

  let nc = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "nc", "license": { "id": "CC_BY_NC" }, "campaigns": [campaign.id] }),
  )
  .await
  .unwrap();
  assert_eq!(nc.links, vec![EntityRef::new(EntityKind::Campaign, campaign.id.clone())]);

  let err = update(&s, alice(), EntityKind::Campaign, &campaign.id, json!({ "license": { "id": "CC_BY_SA" } }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  let campaign = s.get(EntityKind::Campaign, campaign.id).await.unwrap().unwrap();
  assert_eq!(campaign.license.as_deref(), Some("CC_BY"));
}

#[tokio::test]
async fn relicensed_stream_is_checked_against_its_observations_groups() {
  let s = store().await;
  let ds = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "ds", "license": { "id": "CC_BY" } }),
  )
  .await
  .unwrap();
  create(
    &s,
    alice(),
    EntityKind::Observation,
    json!({
      "result": 1,
      "datastream": ds.id,
      "groups": [{ "name": "g", "license": { "id": "CC_BY_SA" }, "party": inline_alice() }],
    }),
  )
  .await
  .unwrap();

  let err = update(&s, alice(), EntityKind::Datastream, &ds.id, json!({ "license": { "id": "CC_BY_NC" } }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  assert!(err.to_string().contains("ObservationGroup"), "{err}");
}

#[tokio::test]
async fn linking_needs_ownership_of_the_other_end() {
  let s = store().await;
  let bobs = create(
    &s,
    bob(),
    EntityKind::Campaign,
    json!({ "name": "bob's", "party": { "authId": "bob" } }),
  )
  .await
  .unwrap();
  let ds = create(&s, alice(), EntityKind::Datastream, json!({ "name": "a" })).await.unwrap();

  let err = create(
    &s,
    alice(),
    EntityKind::Datastream,
    json!({ "name": "b", "campaigns": [bobs.id] }),
  )
  .await
  .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let err = update(&s, bob(), EntityKind::Campaign, &bobs.id, json!({ "datastreams": [ds.id] }))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);

  let bobs = s.get(EntityKind::Campaign, bobs.id).await.unwrap().unwrap();
  assert!(bobs.links.is_empty());
  assert_eq!(s.count(EntityKind::Datastream).await.unwrap(), 1);

  update(&s, root(), EntityKind::Campaign, &bobs.id, json!({ "datastreams": [ds.id] }))
    .await
    .unwrap();
}
