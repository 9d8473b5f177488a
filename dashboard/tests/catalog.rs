mod common;

use common::{record, record_with, setup};
use dashboard::ApiError;
use dashboard::catalog::{RecordDraft, RecordKind};
use dashboard::listing::ListFilter;
use dashboard::records;
use entity::{brand, brand_partnership, product, product_certificate, sub_category};
use sea_orm::{EntityTrait, PaginatorTrait};

fn names(items: &[dashboard::records::RefItem]) -> Vec<&str> {
    items.iter().map(|item| item.name.as_str()).collect()
}

#[tokio::test]
async fn brand_reads_back_lineage_and_partnerships() {
    let db = setup().await;
    let networking = record(&db, RecordKind::Category, "Networking", None).await;
    let switches = record(&db, RecordKind::SubCategory, "Switches", Some(networking)).await;
    let gold = record(&db, RecordKind::Partnership, "Gold", None).await;
    record_with(
        &db,
        RecordKind::Brand,
        "Acme",
        Some(switches),
        &[("partnerships", vec![gold])],
    )
    .await;

    let page = records::list_records(&db, RecordKind::Brand, &ListFilter::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    let acme = &page.items[0];
    assert_eq!(acme.row.name, "Acme");
    assert_eq!(names(&acme.lineage), vec!["Networking", "Switches"]);
    let partnerships = acme
        .associations
        .iter()
        .find(|a| a.name == "partnerships")
        .unwrap();
    assert_eq!(names(&partnerships.items), vec!["Gold"]);
}

#[tokio::test]
async fn association_edits_read_back_exactly() {
    let db = setup().await;
    let networking = record(&db, RecordKind::Category, "Networking", None).await;
    let switches = record(&db, RecordKind::SubCategory, "Switches", Some(networking)).await;
    let acme = record(&db, RecordKind::Brand, "Acme", Some(switches)).await;
    let c1 = record(&db, RecordKind::Certificate, "CCNA", None).await;
    let c2 = record(&db, RecordKind::Certificate, "CCNP", None).await;
    let c3 = record(&db, RecordKind::Certificate, "CCIE", None).await;

    let product = record_with(
        &db,
        RecordKind::Product,
        "X100",
        Some(acme),
        &[("certificates", vec![c1, c2, c2])],
    )
    .await;
    let view = records::get_record(&db, RecordKind::Product, product)
        .await
        .unwrap();
    let mut ids: Vec<_> = view.associations[0].items.iter().map(|i| i.id).collect();
    ids.sort();
    let mut expected = vec![c1, c2];
    expected.sort();
    assert_eq!(ids, expected);

    let edit = RecordDraft {
        name: "X100 Pro".into(),
        parent_id: Some(acme),
        associations: [("certificates".to_string(), vec![c2, c3])].into(),
        ..RecordDraft::default()
    };
    let view = records::save_record(&db, RecordKind::Product, Some(product), edit)
        .await
        .unwrap();
    assert_eq!(view.row.name, "X100 Pro");
    let mut ids: Vec<_> = view.associations[0].items.iter().map(|i| i.id).collect();
    ids.sort();
    let mut expected = vec![c2, c3];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(product_certificate::Entity::find().count(&db).await.unwrap(), 2);

    // leaving the association out keeps the stored set
    let rename = RecordDraft {
        name: "X200".into(),
        parent_id: Some(acme),
        ..RecordDraft::default()
    };
    let view = records::save_record(&db, RecordKind::Product, Some(product), rename)
        .await
        .unwrap();
    assert_eq!(view.associations[0].items.len(), 2);
}

#[tokio::test]
async fn deleting_a_category_leaves_no_orphans() {
    let db = setup().await;
    let networking = record(&db, RecordKind::Category, "Networking", None).await;
    let switches = record(&db, RecordKind::SubCategory, "Switches", Some(networking)).await;
    let gold = record(&db, RecordKind::Partnership, "Gold", None).await;
    let cert = record(&db, RecordKind::Certificate, "CCNA", None).await;
    let acme = record_with(
        &db,
        RecordKind::Brand,
        "Acme",
        Some(switches),
        &[("partnerships", vec![gold])],
    )
    .await;
    record_with(
        &db,
        RecordKind::Product,
        "X100",
        Some(acme),
        &[("certificates", vec![cert])],
    )
    .await;

    records::delete_record(&db, RecordKind::Category, networking)
        .await
        .unwrap();

    assert_eq!(sub_category::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(brand::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(product::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(brand_partnership::Entity::find().count(&db).await.unwrap(), 0);
    assert_eq!(product_certificate::Entity::find().count(&db).await.unwrap(), 0);
    // the link targets themselves survive
    assert_eq!(
        records::count_rows(&db, RecordKind::Partnership).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn unknown_references_are_validation_errors() {
    let db = setup().await;
    let draft = RecordDraft {
        name: "Orphan".into(),
        parent_id: Some(uuid::Uuid::new_v4()),
        ..RecordDraft::default()
    };
    let err = records::save_record(&db, RecordKind::SubCategory, None, draft)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)), "{err:?}");
    assert_eq!(
        records::count_rows(&db, RecordKind::SubCategory).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn form_offers_active_rows_and_keeps_selected_inactive_ones() {
    let db = setup().await;
    record(&db, RecordKind::Category, "Networking", None).await;
    let retired = records::save_record(
        &db,
        RecordKind::Category,
        None,
        RecordDraft {
            name: "Retired".into(),
            is_active: Some(false),
            ..RecordDraft::default()
        },
    )
    .await
    .unwrap()
    .row
    .id;

    let blank = records::record_form(&db, RecordKind::SubCategory, None)
        .await
        .unwrap();
    assert_eq!(names(&blank.parent_options), vec!["Networking"]);

    let legacy = record(&db, RecordKind::SubCategory, "Hubs", Some(retired)).await;
    let editing = records::record_form(&db, RecordKind::SubCategory, Some(legacy))
        .await
        .unwrap();
    let mut offered = names(&editing.parent_options);
    offered.sort();
    assert_eq!(offered, vec!["Networking", "Retired"]);
    assert!(editing.record.is_some());
}

#[tokio::test]
async fn summary_counts_the_whole_table_while_items_are_filtered() {
    let db = setup().await;
    record(&db, RecordKind::Customer, "Acme Corp", None).await;
    record(&db, RecordKind::Customer, "Globex", None).await;
    let filter = ListFilter {
        query: Some("acme".into()),
        ..ListFilter::default()
    };
    let page = records::list_records(&db, RecordKind::Customer, &filter)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.summary.total, 2);
    assert_eq!(page.summary.active, 2);
}

#[tokio::test]
async fn editing_without_active_flag_keeps_the_stored_one() {
    let db = setup().await;
    let globex = records::save_record(
        &db,
        RecordKind::Customer,
        None,
        RecordDraft {
            name: "Globex".into(),
            is_active: Some(false),
            ..RecordDraft::default()
        },
    )
    .await
    .unwrap();
    assert!(!globex.row.is_active);

    let renamed = records::save_record(
        &db,
        RecordKind::Customer,
        Some(globex.row.id),
        RecordDraft {
            name: "Globex Inc".into(),
            ..RecordDraft::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.row.name, "Globex Inc");
    assert!(!renamed.row.is_active);

    let page = records::list_records(&db, RecordKind::Customer, &ListFilter::default())
        .await
        .unwrap();
    assert_eq!(page.summary.inactive, 1);

    // an explicit flag still applies
    let reactivated = records::save_record(
        &db,
        RecordKind::Customer,
        Some(globex.row.id),
        RecordDraft {
            name: "Globex Inc".into(),
            is_active: Some(true),
            ..RecordDraft::default()
        },
    )
    .await
    .unwrap();
    assert!(reactivated.row.is_active);

    // new rows default to active
    let initech = record(&db, RecordKind::Customer, "Initech", None).await;
    let initech = records::get_record(&db, RecordKind::Customer, initech)
        .await
        .unwrap();
    assert!(initech.row.is_active);
}

#[tokio::test]
async fn certificate_products_are_shared_with_the_product_side() {
    let db = setup().await;
    let networking = record(&db, RecordKind::Category, "Networking", None).await;
    let switches = record(&db, RecordKind::SubCategory, "Switches", Some(networking)).await;
    let acme = record(&db, RecordKind::Brand, "Acme", Some(switches)).await;
    let x100 = record(&db, RecordKind::Product, "X100", Some(acme)).await;
    let x200 = record(&db, RecordKind::Product, "X200", Some(acme)).await;
    let x300 = record(&db, RecordKind::Product, "X300", Some(acme)).await;

    let ccna = record_with(
        &db,
        RecordKind::Certificate,
        "CCNA",
        None,
        &[("products", vec![x100, x200, x200])],
    )
    .await;
    let view = records::get_record(&db, RecordKind::Certificate, ccna)
        .await
        .unwrap();
    let products = view
        .associations
        .iter()
        .find(|a| a.name == "products")
        .unwrap();
    assert_eq!(names(&products.items), vec!["X100", "X200"]);

    let product_side = records::get_record(&db, RecordKind::Product, x200)
        .await
        .unwrap();
    let certificates = product_side
        .associations
        .iter()
        .find(|a| a.name == "certificates")
        .unwrap();
    assert_eq!(names(&certificates.items), vec!["CCNA"]);

    let edited = records::save_record(
        &db,
        RecordKind::Certificate,
        Some(ccna),
        RecordDraft {
            name: "CCNA".into(),
            associations: [("products".to_string(), vec![x200, x300])]
                .into_iter()
                .collect(),
            ..RecordDraft::default()
        },
    )
    .await
    .unwrap();
    let products = edited
        .associations
        .iter()
        .find(|a| a.name == "products")
        .unwrap();
    assert_eq!(names(&products.items), vec!["X200", "X300"]);
    assert_eq!(
        product_certificate::Entity::find().count(&db).await.unwrap(),
        2
    );

    let x100_view = records::get_record(&db, RecordKind::Product, x100)
        .await
        .unwrap();
    assert!(x100_view.associations[0].items.is_empty());
}
