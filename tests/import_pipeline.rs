//! End-to-end import runs against the in-memory session.

use dirload::catalog::{
    reference, scalar, vector, CatalogBuilder, FieldKind, FieldTemplate, SchemaCatalog,
};
use dirload::error::ImportError;
use dirload::model::FieldValue;
use dirload::session::MemorySession;
use dirload::types::Invid;
use dirload::upload::{validate_structure, UploadOrchestrator};
use dirload::xml::TokenSource;

const USER: u16 = 1;
const GROUP: u16 = 2;
const VOLUME: u16 = 3;
const ROLE: u16 = 4;

const F_NAME: u16 = 100;
const F_SHELL: u16 = 101;
const F_UID: u16 = 102;
const F_PASSWORD: u16 = 105;
const F_ALIASES: u16 = 106;
const F_GROUPS: u16 = 107;
const F_HOME_GROUP: u16 = 108;
const F_VOLUMES: u16 = 109;
const F_MATRIX: u16 = 110;

fn catalog() -> SchemaCatalog {
    let mut volumes = reference(F_VOLUMES, "Volumes", VOLUME, true);
    volumes.is_embedded = true;

    CatalogBuilder::new()
        .object_type(
            USER,
            "UserBase",
            vec![
                scalar(F_NAME, "Name", FieldKind::String),
                scalar(F_SHELL, "Login Shell", FieldKind::String),
                scalar(F_UID, "UID", FieldKind::Numeric),
                scalar(F_PASSWORD, "Password", FieldKind::Password),
                vector(F_ALIASES, "Aliases", FieldKind::String),
                reference(F_GROUPS, "Groups", GROUP, true),
                reference(F_HOME_GROUP, "Home Group", GROUP, false),
                volumes,
            ],
        )
        .object_type(GROUP, "Group", vec![scalar(F_NAME, "Name", FieldKind::String)])
        .object_type(
            VOLUME,
            "Volume",
            vec![
                scalar(F_NAME, "Name", FieldKind::String),
                scalar(F_SHELL, "Path", FieldKind::String),
            ],
        )
        .object_type(
            ROLE,
            "Role",
            vec![
                scalar(F_NAME, "Name", FieldKind::String),
                FieldTemplate {
                    id: F_MATRIX,
                    name: "Permissions".to_string(),
                    kind: FieldKind::Permission,
                    is_vector: false,
                    is_embedded: false,
                    target_type: None,
                    built_in: false,
                },
            ],
        )
        .build()
}

fn run(session: &MemorySession, doc: &str) -> Result<(), ImportError> {
    let catalog = catalog();
    let mut source = TokenSource::from_string(doc, 32);
    let mut orchestrator = UploadOrchestrator::new(session, &catalog);
    orchestrator.run(&mut source).map(|_| ())
}

fn single_user(session: &MemorySession) -> Invid {
    let users = session.objects_of_type(USER);
    assert_eq!(users.len(), 1, "expected exactly one committed user");
    users[0]
}

#[test]
fn scenario_a_single_object_single_scalar() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\">\
             <field name=\"Name\"><string val=\"alice\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let calls = session.calls();
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("createObject")).count(),
        1
    );
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("setScalarField")).count(),
        1
    );
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("commitTransaction")).count(),
        1
    );
    assert_eq!(session.abort_count(), 0);

    let user = single_user(&session);
    assert_eq!(
        session.scalar_value(user, F_NAME),
        Some(Some(FieldValue::String("alice".to_string())))
    );
}

#[test]
fn scenario_b_unresolved_reference_aborts_cleanly() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"bob\">\
             <field name=\"Groups\">\
               <add><invid type=\"Group\" id=\"staff\"/></add>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::UnresolvedReference { .. }));
    assert_eq!(session.abort_count(), 1);
    assert_eq!(session.commit_count(), 0);

    // nothing is left half-configured
    assert!(session.objects_of_type(USER).is_empty());
}

#[test]
fn scenario_c_set_and_add_on_independent_objects() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"u1\">\
             <field name=\"Aliases\">\
               <set><string val=\"a\"/><string val=\"b\"/></set>\
             </field>\
           </object>\
           <object type=\"UserBase\" id=\"u2\">\
             <field name=\"Aliases\">\
               <add><string val=\"c\"/></add>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let users = session.objects_of_type(USER);
    assert_eq!(users.len(), 2);
    assert_eq!(
        session.vector_values(users[0], F_ALIASES),
        vec![
            FieldValue::String("a".to_string()),
            FieldValue::String("b".to_string())
        ]
    );
    assert_eq!(
        session.vector_values(users[1], F_ALIASES),
        vec![FieldValue::String("c".to_string())]
    );
}

#[test]
fn reference_resolves_to_in_document_object_defined_later() {
    // the <invid> points forward to a Group defined after the user
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"carol\">\
             <field name=\"Groups\">\
               <add><invid type=\"Group\" id=\"ops\"/></add>\
             </field>\
           </object>\
           <object type=\"Group\" id=\"ops\">\
             <field name=\"Name\"><string val=\"ops\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    let groups = session.objects_of_type(GROUP);
    assert_eq!(groups.len(), 1);
    assert_eq!(
        session.vector_values(user, F_GROUPS),
        vec![FieldValue::Invid(groups[0])]
    );
}

#[test]
fn reference_resolves_to_seeded_server_object() {
    let session = MemorySession::new();
    let staff = session.seed_object(GROUP, "staff");

    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"dave\">\
             <field name=\"Home Group\"><invid type=\"Group\" id=\"staff\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    assert_eq!(
        session.scalar_value(user, F_HOME_GROUP),
        Some(Some(FieldValue::Invid(staff)))
    );
}

#[test]
fn embedded_object_created_before_referencing_mutation() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"erin\">\
             <field name=\"Volumes\">\
               <add>\
                 <object type=\"Volume\">\
                   <field name=\"Name\"><string val=\"scratch\"/></field>\
                   <field name=\"Path\"><string val=\"/export/scratch\"/></field>\
                 </object>\
               </add>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    let volumes = session.objects_of_type(VOLUME);
    assert_eq!(volumes.len(), 1);
    assert_eq!(
        session.vector_values(user, F_VOLUMES),
        vec![FieldValue::Invid(volumes[0])]
    );
    assert_eq!(
        session.scalar_value(volumes[0], F_NAME),
        Some(Some(FieldValue::String("scratch".to_string())))
    );

    // every create precedes the referencing vector mutation
    let calls = session.calls();
    let last_create = calls
        .iter()
        .rposition(|c| c.starts_with("createObject"))
        .unwrap();
    let ref_mutation = calls
        .iter()
        .position(|c| c.starts_with(&format!("addVectorElements({}:{}, {})", USER, 1000, F_VOLUMES)))
        .unwrap();
    assert!(last_create < ref_mutation);
}

#[test]
fn fields_register_in_declared_display_order() {
    // document order is Shell before Name; declared order is Name first
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\">\
             <field name=\"Login Shell\"><string val=\"/bin/zsh\"/></field>\
             <field name=\"Name\"><string val=\"frank\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    let calls = session.calls();
    let name_call = calls
        .iter()
        .position(|c| *c == format!("setScalarField({}, {})", user, F_NAME))
        .unwrap();
    let shell_call = calls
        .iter()
        .position(|c| *c == format!("setScalarField({}, {})", user, F_SHELL))
        .unwrap();
    assert!(name_call < shell_call);
}

#[test]
fn duplicate_identity_aborts_before_any_create() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"gina\"/>\
           <object type=\"UserBase\" id=\"gina\"/>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::DuplicateIdentity(_)));
    assert_eq!(session.abort_count(), 1);
    assert!(session
        .calls()
        .iter()
        .all(|c| !c.starts_with("createObject")));
}

#[test]
fn edit_of_missing_object_fails_before_any_mutation() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"nobody\" action=\"edit\">\
             <field name=\"Name\"><string val=\"nobody\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::NoSuchObject { .. }));
    assert_eq!(session.abort_count(), 1);
    assert!(session
        .calls()
        .iter()
        .all(|c| !c.starts_with("setScalarField")));
}

#[test]
fn create_or_edit_reuses_existing_object() {
    let session = MemorySession::new();
    let existing = session.seed_object(USER, "harry");

    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"harry\">\
             <field name=\"Name\"><string val=\"harry\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    // no new user was created; the seeded one was edited
    assert_eq!(session.objects_of_type(USER), vec![existing]);
    assert_eq!(
        session.scalar_value(existing, F_NAME),
        Some(Some(FieldValue::String("harry".to_string())))
    );
}

#[test]
fn forced_create_never_reuses_a_match() {
    let session = MemorySession::new();
    let existing = session.seed_object(USER, "iris");

    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"iris\" action=\"create\">\
             <field name=\"Name\"><string val=\"iris\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let users = session.objects_of_type(USER);
    assert_eq!(users.len(), 2);
    assert!(users.contains(&existing));
}

#[test]
fn delete_action_removes_object_in_transaction() {
    let session = MemorySession::new();
    let doomed = session.seed_object(USER, "jan");

    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"jan\" action=\"delete\"/>\
         </data></directory>",
    )
    .unwrap();

    assert!(!session.object_exists(doomed));
}

#[test]
fn inactivate_action_marks_object() {
    let session = MemorySession::new();
    let target = session.seed_object(USER, "kim");

    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"kim\" action=\"inactivate\"/>\
         </data></directory>",
    )
    .unwrap();

    assert!(session.object_exists(target));
    assert!(session.is_inactive(target));
}

#[test]
fn vector_mode_conflict_aborts_without_field_mutations() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"lee\">\
             <field name=\"Aliases\">\
               <set><string val=\"a\"/></set>\
               <add><string val=\"b\"/></add>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::VectorModeConflict { .. }));
    assert_eq!(session.abort_count(), 1);
    assert!(session
        .calls()
        .iter()
        .all(|c| !c.contains("VectorElements")));
}

#[test]
fn unknown_field_skipped_run_still_commits() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"mona\">\
             <field name=\"Shoe Size\"><int val=\"7\"/></field>\
             <field name=\"Name\"><string val=\"mona\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    assert_eq!(
        session.scalar_value(user, F_NAME),
        Some(Some(FieldValue::String("mona".to_string())))
    );
}

#[test]
fn unknown_object_type_fails_run_before_any_remote_call() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"Printer\" id=\"lobby\"/>\
           <object type=\"UserBase\" id=\"nora\"/>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::UnknownObjectType(_)));
    assert_eq!(session.abort_count(), 1);
    assert_eq!(session.commit_count(), 0);
    assert!(session
        .calls()
        .iter()
        .all(|c| !c.starts_with("createObject")));
}

#[test]
fn failed_commit_aborts_with_diagnostic() {
    let session = MemorySession::new();
    session.fail_on("commitTransaction");

    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\">\
             <field name=\"Name\"><string val=\"pat\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::CommitFailed(_)));
    assert_eq!(session.abort_count(), 1);
    assert!(session.objects_of_type(USER).is_empty());
}

#[test]
fn failed_create_halts_further_registration() {
    let session = MemorySession::new();
    session.fail_on("createObject");

    let err = run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\">\
             <field name=\"Name\"><string val=\"quinn\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::Remote { .. }));
    assert_eq!(session.abort_count(), 1);
    assert!(session
        .calls()
        .iter()
        .all(|c| !c.starts_with("setScalarField")));
}

#[test]
fn password_forms_transmitted_together() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"UserBase\" id=\"rita\">\
             <field name=\"Password\">\
               <password crypt=\"abXy99\" md5crypt=\"$1$s$h\"/>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let user = single_user(&session);
    let spec = session.password_value(user, F_PASSWORD).unwrap();
    assert_eq!(spec.plaintext, None);
    assert_eq!(spec.crypt.as_deref(), Some("abXy99"));
    assert_eq!(spec.md5crypt.as_deref(), Some("$1$s$h"));
}

#[test]
fn permission_rows_registered_per_type_and_field() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <object type=\"Role\" id=\"helpdesk\">\
             <field name=\"Name\"><string val=\"helpdesk\"/></field>\
             <field name=\"Permissions\">\
               <permissions>\
                 <type name=\"UserBase\" perm=\"VEcd\">\
                   <field name=\"Name\" perm=\"Vecd\"/>\
                 </type>\
               </permissions>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    let roles = session.objects_of_type(ROLE);
    assert_eq!(roles.len(), 1);
    let rows = session.permission_rows(roles[0], F_MATRIX);
    assert_eq!(rows.len(), 2);

    let (type_row, field_row) = (&rows[0], &rows[1]);
    assert_eq!(type_row.0, USER);
    assert_eq!(type_row.1, None);
    assert!(type_row.2.viewable && type_row.2.editable);
    assert!(!type_row.2.creatable && !type_row.2.deletable);

    assert_eq!(field_row.0, USER);
    assert_eq!(field_row.1, Some(F_NAME));
    assert!(field_row.2.viewable && !field_row.2.editable);
}

#[test]
fn permission_block_with_unknown_type_aborts() {
    let session = MemorySession::new();
    let err = run(
        &session,
        "<directory><data>\
           <object type=\"Role\" id=\"broken\">\
             <field name=\"Permissions\">\
               <permissions><type name=\"Printer\" perm=\"VEcd\"/></permissions>\
             </field>\
           </object>\
         </data></directory>",
    )
    .unwrap_err();

    assert!(matches!(err, ImportError::UnknownPermissionTarget { .. }));
    assert_eq!(session.abort_count(), 1);
}

#[test]
fn comment_element_does_not_disturb_import() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory><data>\
           <comment>nightly sync from HR feed</comment>\
           <object type=\"UserBase\" id=\"sam\">\
             <field name=\"Name\"><string val=\"sam\"/></field>\
           </object>\
         </data></directory>",
    )
    .unwrap();

    assert_eq!(session.commit_count(), 1);
}

#[test]
fn schema_section_is_skipped_structurally() {
    let session = MemorySession::new();
    run(
        &session,
        "<directory>\
           <schema><typedef name=\"UserBase\"><fielddef name=\"Name\"/></typedef></schema>\
           <data>\
             <object type=\"UserBase\" id=\"tess\">\
               <field name=\"Name\"><string val=\"tess\"/></field>\
             </object>\
           </data>\
         </directory>",
    )
    .unwrap();

    assert_eq!(session.objects_of_type(USER).len(), 1);
}

#[test]
fn validate_structure_reports_counts() {
    let mut source = TokenSource::from_string(
        "<directory>\
           <schema><typedef name=\"X\"/></schema>\
           <data>\
             <object type=\"UserBase\"><field name=\"Name\"><string val=\"v\"/></field></object>\
             <object type=\"Group\"/>\
           </data>\
         </directory>",
        16,
    );
    let report = validate_structure(&mut source).unwrap();
    assert_eq!(report.objects, 2);
    assert_eq!(report.fields, 1);
    assert!(report.has_schema);
}

#[test]
fn validate_structure_rejects_malformed_markup() {
    let mut source = TokenSource::from_string("<directory><data><object type=\"U\"></data>", 16);
    assert!(validate_structure(&mut source).is_err());
}
