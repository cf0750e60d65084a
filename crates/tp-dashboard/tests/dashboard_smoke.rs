use tp_dashboard::{DashboardOptions, RetailSchema, build_views};
use tp_filter::FilterSpec;
use tp_io::read_csv_str;
use tp_types::Scalar;

const SUPERSTORE_SAMPLE: &str = "\
Row ID,Category,Sub-Category,Segment,State,Order Date,Ship Date,Postal Code,Sales,Profit,Discount
1,Furniture,Chairs,Consumer,Texas,11/8/2016,11/11/2016,77095,100,10,0.2
2,Furniture,Tables,Corporate,Ohio,12/1/2016,12/5/2016,43229,50,-5,0.4
3,Technology,Phones,Consumer,Texas,11/20/2016,11/22/2016,77095,200,40,0
4,Technology,Phones,Consumer,Texas,11/20/2016,11/22/2016,77095,200,40,0
5,Office Supplies,Binders,Home Office,Utah,1/15/2017,1/18/2017,84057,30,5,0.1
";

fn utf8(value: &str) -> Scalar {
    Scalar::Utf8(value.to_owned())
}

#[test]
fn full_pipeline_from_csv_to_views() {
    let schema = RetailSchema::default();
    let (table, report) =
        read_csv_str(SUPERSTORE_SAMPLE, &schema.load_options()).expect("load should pass");

    // Row 4 only collides with row 3 once Row ID is dropped.
    assert_eq!(report.rows_read, 5);
    assert_eq!(report.duplicate_rows_dropped, 1);
    assert_eq!(
        report.fields_dropped,
        vec!["Row ID".to_owned(), "Postal Code".to_owned()]
    );
    assert!(!table.has_field("Postal Code"));

    let views = build_views(
        &table,
        &FilterSpec::new(),
        &schema,
        &DashboardOptions::default(),
    )
    .expect("views should build");

    assert_eq!(views.filtered_rows, 4);

    // Trend entries come back in chronological period order.
    assert_eq!(
        views.monthly_trend.keys(),
        &[utf8("2016-11"), utf8("2016-12"), utf8("2017-01")]
    );
    assert_eq!(
        views.monthly_trend.measure("Sales").expect("sales"),
        &[300.0, 50.0, 30.0]
    );

    // Category totals conserve the overall sales total.
    let category_sales: f64 = views
        .category_summary
        .measure("Sales")
        .expect("sales")
        .iter()
        .sum();
    assert_eq!(category_sales, 380.0);

    // State rankings are mirror images for distinct profits.
    assert_eq!(views.top_states.keys()[0], utf8("Texas"));
    assert_eq!(views.bottom_states.keys()[0], utf8("Ohio"));
    assert_eq!(views.top_states.len(), 3);

    // Sub-category profits rank ascending, worst performer first.
    assert_eq!(views.sub_category_profit.keys()[0], utf8("Tables"));

    assert_eq!(views.discount_profit.len(), 4);
    assert_eq!(views.discount_profit[0].hue, "Furniture");
}

#[test]
fn category_selection_narrows_every_view() {
    let schema = RetailSchema::default();
    let (table, _) =
        read_csv_str(SUPERSTORE_SAMPLE, &schema.load_options()).expect("load should pass");

    let spec = FilterSpec::new().allow_utf8(schema.category.clone(), ["Furniture"]);
    let views = build_views(&table, &spec, &schema, &DashboardOptions::default())
        .expect("views should build");

    assert_eq!(views.filtered_rows, 2);
    assert_eq!(views.category_summary.keys(), &[utf8("Furniture")]);
    assert_eq!(
        views.segment_performance.keys(),
        &[utf8("Consumer"), utf8("Corporate")]
    );
    assert_eq!(
        views.monthly_trend.measure("Profit").expect("profit"),
        &[10.0, -5.0]
    );
}

#[test]
fn cleared_selection_yields_empty_views_not_errors() {
    let schema = RetailSchema::default();
    let (table, _) =
        read_csv_str(SUPERSTORE_SAMPLE, &schema.load_options()).expect("load should pass");

    let spec = FilterSpec::new().allow_utf8(schema.category.clone(), Vec::<String>::new());
    let views = build_views(&table, &spec, &schema, &DashboardOptions::default())
        .expect("views should build");

    assert_eq!(views.filtered_rows, 0);
    assert!(views.monthly_trend.is_empty());
    assert!(views.top_states.is_empty());
    assert!(views.discount_profit.is_empty());
}
