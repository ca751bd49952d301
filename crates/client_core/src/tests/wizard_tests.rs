use super::*;

use async_trait::async_trait;
use shared::domain::{Case, User, UserId};
use tokio::sync::Notify;

fn perito() -> CurrentUser {
    User {
        id: UserId::from("u1"),
        username: "ana.perita".into(),
        role: "perito".into(),
    }
}

fn wizard() -> CaseWizard {
    CaseWizard::with_opening_date(
        perito(),
        NaiveDate::from_ymd_opt(2024, 6, 3).expect("date"),
    )
}

fn filled_wizard() -> CaseWizard {
    let mut wizard = wizard();
    wizard.set_field(WizardField::CaseNumber, "2024-077");
    wizard.set_field(WizardField::Title, "Arcada sem identificação");
    wizard.set_status(CaseStatus::InProgress);
    wizard.set_field(WizardField::CaseType, "Identificação Humana");
    wizard.set_field(WizardField::DemandOrigin, "IML");
    wizard.set_field(WizardField::Latitude, "-8.0476");
    wizard.set_field(WizardField::Longitude, " -34.877 ");
    wizard.set_field(WizardField::FullAddress, "Recife");
    wizard.jump_to(2).expect("location step");
    wizard
}

#[derive(Default)]
struct RecordingBackend {
    created: Mutex<Vec<NewCaseRequest>>,
    fail_status: Option<u16>,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

#[async_trait]
impl CaseBackend for RecordingBackend {
    async fn list_cases(&self) -> CoreResult<Vec<Case>> {
        Ok(Vec::new())
    }

    async fn create_case(&self, request: &NewCaseRequest) -> CoreResult<()> {
        if let Some((entered, release)) = &self.hold {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(status) = self.fail_status {
            return Err(CoreError::network(Some(status), "Falha ao salvar caso"));
        }
        self.created.lock().await.push(request.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> CoreResult<User> {
        Err(CoreError::NotFound(format!("user {user_id}")))
    }
}

struct FakeGeolocator {
    permission: PermissionStatus,
    position: Option<Coordinates>,
    places: Vec<GeocodedPlace>,
    geocode_fails: bool,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeGeolocator {
    fn at(latitude: f64, longitude: f64, places: Vec<GeocodedPlace>) -> Self {
        Self {
            permission: PermissionStatus::Granted,
            position: Some(Coordinates {
                latitude,
                longitude,
            }),
            places,
            geocode_fails: false,
            hold: None,
        }
    }

    fn denied() -> Self {
        Self {
            permission: PermissionStatus::Denied,
            position: None,
            places: Vec::new(),
            geocode_fails: false,
            hold: None,
        }
    }
}

#[async_trait]
impl Geolocator for FakeGeolocator {
    async fn request_permission(&self) -> CoreResult<PermissionStatus> {
        Ok(self.permission)
    }

    async fn current_position(&self) -> CoreResult<Coordinates> {
        if let Some((entered, release)) = &self.hold {
            entered.notify_one();
            release.notified().await;
        }
        self.position
            .ok_or_else(|| CoreError::Geolocation("no fix".into()))
    }

    async fn reverse_geocode(&self, _coordinates: Coordinates) -> CoreResult<Vec<GeocodedPlace>> {
        if self.geocode_fails {
            return Err(CoreError::Geolocation("geocoder offline".into()));
        }
        Ok(self.places.clone())
    }
}

fn recife() -> GeocodedPlace {
    GeocodedPlace {
        postal_code: Some("50030-230".into()),
        street: Some("Rua da Aurora".into()),
        city: Some("Recife".into()),
        region: Some("PE".into()),
        country: Some("Brasil".into()),
        ..GeocodedPlace::default()
    }
}

fn session(
    wizard: CaseWizard,
    backend: Arc<RecordingBackend>,
    geolocator: impl Geolocator + 'static,
) -> Arc<WizardSession> {
    WizardSession::new(wizard, backend, Arc::new(geolocator))
}

#[test]
fn new_wizard_prefills_responsible_and_opening_date() {
    let wizard = wizard();
    assert_eq!(wizard.step(), WizardStep::Identification);
    assert_eq!(wizard.form().identification.expert_responsible, "ana.perita");
    assert_eq!(wizard.field(WizardField::OpenedAt), "2024-06-03");
    assert_eq!(wizard.form().identification.status, None);
}

#[test]
fn navigation_clamps_at_both_ends() {
    let mut wizard = wizard();
    assert_eq!(wizard.go_back(), WizardStep::Identification);
    assert_eq!(wizard.go_next(), WizardStep::CaseContext);
    assert_eq!(wizard.go_back(), WizardStep::Identification);

    wizard.go_next();
    wizard.go_next();
    assert_eq!(wizard.go_next(), WizardStep::Location);
    assert_eq!(wizard.step().index(), 2);
}

#[test]
fn next_then_back_returns_to_each_interior_step() {
    for start in [0, 1] {
        let mut wizard = wizard();
        wizard.jump_to(start).expect("jump");
        wizard.go_next();
        wizard.go_back();
        assert_eq!(wizard.step().index(), start);
    }
}

#[test]
fn advancing_never_requires_filled_fields() {
    let mut wizard = wizard();
    wizard.go_next();
    wizard.go_next();
    assert_eq!(wizard.step(), WizardStep::Location);
    assert!(wizard.field(WizardField::CaseNumber).is_empty());
}

#[test]
fn jump_to_accepts_any_step_and_rejects_out_of_range() {
    let mut wizard = wizard();
    assert_eq!(wizard.jump_to(2).expect("jump"), WizardStep::Location);
    assert_eq!(wizard.jump_to(0).expect("jump"), WizardStep::Identification);

    wizard.jump_to(1).expect("jump");
    let err = wizard.jump_to(3).expect_err("out of range");
    assert!(matches!(err, CoreError::Validation { field: "step", .. }));
    assert_eq!(wizard.step(), WizardStep::CaseContext);
}

#[test]
fn set_field_stores_values_verbatim_in_their_section() {
    let mut wizard = wizard();
    wizard.set_field(WizardField::Latitude, "abc");
    wizard.set_field(WizardField::IndividualEstimatedAge, "");
    wizard.set_field(WizardField::Description, "  espaços  ");
    assert_eq!(wizard.field(WizardField::Latitude), "abc");
    assert_eq!(wizard.form().context.description, "  espaços  ");
    assert_eq!(WizardField::Latitude.section(), WizardStep::Location);
    assert_eq!(WizardField::DemandOrigin.section(), WizardStep::CaseContext);
}

#[test]
fn payload_parses_coordinates_and_keeps_other_fields() {
    let payload = filled_wizard().submission_payload().expect("payload");
    assert_eq!(payload.case_number, "2024-077");
    assert_eq!(payload.status, Some(CaseStatus::InProgress));
    assert_eq!(payload.expert_responsible, "ana.perita");
    assert_eq!(payload.opened_at, "2024-06-03");
    assert_eq!(payload.location.latitude, -8.0476);
    assert_eq!(payload.location.longitude, -34.877);
    assert_eq!(payload.location.formatted_address, "Recife");
}

#[test]
fn payload_rejects_non_finite_coordinates() {
    let mut wizard = filled_wizard();
    wizard.set_field(WizardField::Longitude, "inf");
    let err = wizard.submission_payload().expect_err("infinite");
    assert!(matches!(err, CoreError::Validation { field: "longitude", .. }));

    wizard.set_field(WizardField::Longitude, "");
    assert!(wizard.submission_payload().is_err());
}

#[test]
fn address_format_keeps_separators_for_missing_parts() {
    assert_eq!(format_address(&GeocodedPlace::default()), " , , , ");

    let place = GeocodedPlace {
        postal_code: Some("50030-230".into()),
        street: Some("Rua da Aurora".into()),
        subregion: None,
        city: Some("Recife".into()),
        region: Some("PE".into()),
        country: Some("Brasil".into()),
    };
    assert_eq!(
        format_address(&place),
        "50030-230 Rua da Aurora, Recife, PE, Brasil"
    );

    let with_subregion = GeocodedPlace {
        subregion: Some("Região Metropolitana".into()),
        ..place
    };
    assert_eq!(
        format_address(&with_subregion),
        "50030-230 Rua da Aurora, Região Metropolitana, PE, Brasil"
    );
}

#[tokio::test]
async fn submit_with_malformed_latitude_never_reaches_backend() {
    let backend = Arc::new(RecordingBackend::default());
    let mut wizard = filled_wizard();
    wizard.set_field(WizardField::Latitude, "not-a-number");
    let session = session(wizard, backend.clone(), FakeGeolocator::denied());

    let err = session.submit().await.expect_err("invalid latitude");
    assert!(matches!(err, CoreError::Validation { field: "latitude", .. }));
    assert!(backend.created.lock().await.is_empty());
    assert_eq!(session.form().await.location.latitude, "not-a-number");
}

#[tokio::test]
async fn submit_before_location_step_never_reaches_backend() {
    let backend = Arc::new(RecordingBackend::default());
    let session = session(filled_wizard(), backend.clone(), FakeGeolocator::denied());

    for step in [0, 1] {
        session
            .with_wizard(|wizard| wizard.jump_to(step))
            .await
            .expect("jump");
        let err = session.submit().await.expect_err("wrong step");
        assert!(matches!(err, CoreError::Validation { field: "step", .. }));
    }

    assert!(backend.created.lock().await.is_empty());
    let form = session.form().await;
    assert_eq!(form.step, WizardStep::CaseContext);
    assert_eq!(form.identification.case_number, "2024-077");
    assert!(!session.is_in_flight(WizardOp::Submit));
}

#[tokio::test]
async fn successful_submit_discards_form() {
    let backend = Arc::new(RecordingBackend::default());
    let session = session(filled_wizard(), backend.clone(), FakeGeolocator::denied());

    session.submit().await.expect("submit");

    assert_eq!(backend.created.lock().await.len(), 1);
    assert_eq!(session.form().await, wizard().form().clone());
    assert!(!session.is_in_flight(WizardOp::Submit));
}

#[tokio::test]
async fn failed_submit_preserves_every_field() {
    let backend = Arc::new(RecordingBackend {
        fail_status: Some(500),
        ..RecordingBackend::default()
    });
    let before = filled_wizard();
    let session = session(before.clone(), backend.clone(), FakeGeolocator::denied());

    let err = session.submit().await.expect_err("server error");
    assert_eq!(err.status(), Some(500));
    assert_eq!(session.form().await, before.form().clone());
    assert!(!session.is_in_flight(WizardOp::Submit));
}

#[tokio::test]
async fn second_submit_while_first_is_pending_is_busy() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let backend = Arc::new(RecordingBackend {
        hold: Some((entered.clone(), release.clone())),
        ..RecordingBackend::default()
    });
    let session = session(filled_wizard(), backend.clone(), FakeGeolocator::denied());

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit().await }
    });
    entered.notified().await;

    assert!(session.is_in_flight(WizardOp::Submit));
    let err = session.submit().await.expect_err("busy");
    assert!(matches!(err, CoreError::Busy(_)));

    session
        .with_wizard(|wizard| wizard.set_field(WizardField::Title, "editado"))
        .await;

    release.notify_one();
    first.await.expect("join").expect("first submit");
    assert_eq!(backend.created.lock().await.len(), 1);
    assert!(!session.is_in_flight(WizardOp::Submit));
}

#[tokio::test]
async fn location_lookup_and_submit_run_side_by_side() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let backend = Arc::new(RecordingBackend {
        hold: Some((entered.clone(), release.clone())),
        ..RecordingBackend::default()
    });
    let session = session(
        filled_wizard(),
        backend.clone(),
        FakeGeolocator::at(-8.0631, -34.8711, vec![recife()]),
    );

    let pending_submit = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit().await }
    });
    entered.notified().await;

    session.resolve_current_location().await.expect("locate");
    assert!(session.is_in_flight(WizardOp::Submit));

    release.notify_one();
    pending_submit.await.expect("join").expect("submit");
    assert_eq!(backend.created.lock().await.len(), 1);
}

#[tokio::test]
async fn second_location_lookup_while_first_is_pending_is_busy() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let geolocator = FakeGeolocator {
        hold: Some((entered.clone(), release.clone())),
        ..FakeGeolocator::at(-8.0631, -34.8711, vec![recife()])
    };
    let session = session(wizard(), Arc::new(RecordingBackend::default()), geolocator);

    let first = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.resolve_current_location().await }
    });
    entered.notified().await;

    assert!(session.is_in_flight(WizardOp::ResolveLocation));
    let err = session
        .resolve_current_location()
        .await
        .expect_err("busy");
    assert!(matches!(err, CoreError::Busy(_)));
    let err = session
        .pick_location(Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        })
        .await
        .expect_err("busy");
    assert!(matches!(err, CoreError::Busy(_)));

    release.notify_one();
    first.await.expect("join").expect("first lookup");
    assert_eq!(session.form().await.location.latitude, "-8.0631");
    assert!(!session.is_in_flight(WizardOp::ResolveLocation));
}

#[tokio::test]
async fn picked_location_uses_geocoded_address() {
    let session = session(
        wizard(),
        Arc::new(RecordingBackend::default()),
        FakeGeolocator::at(0.0, 0.0, vec![recife()]),
    );

    session
        .pick_location(Coordinates {
            latitude: -8.06,
            longitude: -34.87,
        })
        .await
        .expect("pick");

    let form = session.form().await;
    assert_eq!(form.location.latitude, "-8.06");
    assert_eq!(form.location.longitude, "-34.87");
    assert_eq!(
        form.location.full_address,
        "50030-230 Rua da Aurora, Recife, PE, Brasil"
    );
}

#[tokio::test]
async fn picked_location_keeps_coordinates_when_geocoding_fails() {
    let geolocator = FakeGeolocator {
        geocode_fails: true,
        ..FakeGeolocator::at(0.0, 0.0, vec![recife()])
    };
    let session = session(filled_wizard(), Arc::new(RecordingBackend::default()), geolocator);

    session
        .pick_location(Coordinates {
            latitude: -7.5,
            longitude: -35.25,
        })
        .await
        .expect("pick");

    let form = session.form().await;
    assert_eq!(form.location.latitude, "-7.5");
    assert_eq!(form.location.longitude, "-35.25");
    assert_eq!(form.location.full_address, "");
    assert!(!session.is_in_flight(WizardOp::ResolveLocation));
}

#[tokio::test]
async fn resolve_location_fills_coordinates_and_address() {
    let session = session(
        wizard(),
        Arc::new(RecordingBackend::default()),
        FakeGeolocator::at(-8.0631, -34.8711, vec![recife()]),
    );

    session.resolve_current_location().await.expect("locate");

    let form = session.form().await;
    assert_eq!(form.location.latitude, "-8.0631");
    assert_eq!(form.location.longitude, "-34.8711");
    assert_eq!(
        form.location.full_address,
        "50030-230 Rua da Aurora, Recife, PE, Brasil"
    );
    assert!(session
        .with_wizard(|wizard| {
            wizard.go_next();
            wizard.go_next();
            wizard.submission_payload()
        })
        .await
        .is_ok());
}

#[tokio::test]
async fn resolve_location_without_geocode_result_uses_empty_address() {
    let session = session(
        wizard(),
        Arc::new(RecordingBackend::default()),
        FakeGeolocator::at(1.5, 2.25, Vec::new()),
    );

    session.resolve_current_location().await.expect("locate");

    let form = session.form().await;
    assert_eq!(form.location.latitude, "1.5");
    assert_eq!(form.location.full_address, " , , , ");
}

#[tokio::test]
async fn denied_permission_leaves_location_untouched() {
    let session = session(
        filled_wizard(),
        Arc::new(RecordingBackend::default()),
        FakeGeolocator::denied(),
    );

    let err = session
        .resolve_current_location()
        .await
        .expect_err("denied");
    assert!(matches!(err, CoreError::PermissionDenied));
    let form = session.form().await;
    assert_eq!(form.location.latitude, "-8.0476");
    assert_eq!(form.location.full_address, "Recife");
    assert!(!session.is_in_flight(WizardOp::ResolveLocation));
}

#[tokio::test]
async fn missing_geolocator_reports_failure() {
    let session = session(
        wizard(),
        Arc::new(RecordingBackend::default()),
        crate::MissingGeolocator,
    );

    let err = session
        .resolve_current_location()
        .await
        .expect_err("unavailable");
    assert!(matches!(err, CoreError::Geolocation(_)));
    assert!(session.form().await.location.latitude.is_empty());
}
