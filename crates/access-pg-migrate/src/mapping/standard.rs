//! Mappings for the legacy textile production database.

use super::{DefaultValue, LookupKeyConfig, MappingCatalog, TableMapping};
use crate::transform::Transform;

const REFERENCE_TABLES: &[&str] = &["Customers", "Yarn_Types", "Fabric_Quality", "Users"];

// Each table follows every table it references.
const MIGRATION_ORDER: &[&str] = &[
    "Customers",
    "Yarn_Types",
    "Fabric_Quality",
    "Users",
    "Fabric_Content",
    "Stock_Ref",
    "Customer_Orders",
    "Delivery_Note",
    "UserLogs",
    "Yarn_Stock",
    "Pack_Info",
    "Production_Information",
];

fn id() -> Transform {
    Transform::Identifier { reuse: false }
}

fn text() -> Transform {
    Transform::text()
}

impl MappingCatalog {
    /// Catalog for the Access production database.
    pub fn standard() -> Self {
        MappingCatalog::new(
            standard_tables(),
            standard_lookups(),
            REFERENCE_TABLES.iter().map(|t| t.to_string()).collect(),
            MIGRATION_ORDER.iter().map(|t| t.to_string()).collect(),
        )
    }
}

fn standard_lookups() -> Vec<LookupKeyConfig> {
    vec![
        LookupKeyConfig::new("Customers", "customers", "Customer", "name"),
        LookupKeyConfig::new("Yarn_Types", "yarn_types", "Yarn_Code", "code").with_alternate(
            "Yarn_Type",
            "description",
            "yarn_types_by_description",
        ),
        LookupKeyConfig::new("Fabric_Quality", "fabric_quality", "Fab_Qual_No", "quality_code"),
        LookupKeyConfig::new("Users", "users", "User_Code", "email").with_alternate(
            "User_Name",
            "name",
            "users_by_name",
        ),
        LookupKeyConfig::new(
            "Customer_Orders",
            "customer_orders",
            "Job_Card_No",
            "job_card_number",
        ),
        LookupKeyConfig::new("Delivery_Note", "delivery_note", "Delivery_No", "delivery_number"),
        LookupKeyConfig::new("Pack_Info", "pack_info", "PackNo", "pack_slip_number"),
    ]
}

fn standard_tables() -> Vec<TableMapping> {
    vec![
        TableMapping::new("Customers", "customers")
            .field("Customer", "name")
            .field("Person", "contact_person")
            .field("Tel_No", "phone")
            .field("Fax_No", "fax")
            .field("Cell_No", "cellphone")
            .transform("id", id())
            .transform("name", text())
            .transform("contact_person", text())
            .transform("phone", text())
            .transform("fax", text())
            .transform("cellphone", text())
            .transform("email", text())
            .transform("address", text())
            .transform("active", Transform::Boolean)
            .required(&["name"]),
        // Note has no destination column; Yarn_Type is the description.
        TableMapping::new("Yarn_Types", "yarn_types")
            .field("Yarn_Code", "code")
            .field("Yarn_Type", "description")
            .field("Tex", "tex_count")
            .field("Supplier", "supplier_name")
            .transform("id", id())
            .transform("code", text())
            .transform("description", text())
            .transform("material", text())
            .transform("tex_count", text())
            .transform("color", text())
            .transform("supplier_name", text())
            .transform("supplier_code", text())
            .transform("unit_price", Transform::Decimal)
            .transform("active", Transform::Boolean)
            .required(&["code"]),
        TableMapping::new("Fabric_Quality", "fabric_quality")
            .field("Fab_Qual_No", "quality_code")
            .field("Name", "description")
            .field("Geige_Width", "greige_dimensions")
            .field("Geige_Weight", "greige_density")
            .field("Finish_Width", "finished_dimensions")
            .field("Finish_Weight", "finished_density")
            .field("Gauge", "machine_gauge")
            .field("Mach_No", "machine_type")
            .field("Spec_No", "spec_sheet_ref")
            .field("Slitting_Line", "slitting_required")
            .transform("id", id())
            .transform("quality_code", text())
            .transform("description", text())
            .transform("greige_dimensions", text())
            .transform("finished_dimensions", text())
            .transform("greige_density", text())
            .transform("finished_density", text())
            .transform("width", Transform::Decimal)
            .transform("weight", Transform::Decimal)
            .transform("machine_gauge", text())
            .transform("machine_type", text())
            .transform("spec_sheet_ref", text())
            .transform("slitting_required", Transform::Boolean)
            .transform("active", Transform::Boolean)
            .required(&["quality_code"]),
        TableMapping::new("Users", "users")
            .field("User_Code", "email")
            .field("User_Name", "name")
            .field("Manager_Flag", "role")
            .transform("id", id())
            .transform("email", text())
            .transform("name", text())
            .transform("role", Transform::label("manager", "standard"))
            .transform("active", Transform::Boolean)
            .required(&["email", "name"]),
        TableMapping::new("Fabric_Content", "fabric_content")
            .field("Fab_Quality", "quality_id")
            .field("TypeYC", "yarn_type_id")
            .field("Percent", "percentage")
            .field("UNQ_ID", "position")
            .transform("id", id())
            .transform("quality_id", Transform::foreign_key("fabric_quality", false))
            .transform(
                "yarn_type_id",
                Transform::foreign_key("yarn_types_by_description", false),
            )
            .transform("percentage", Transform::Decimal)
            .transform("position", Transform::Integer)
            .required(&["quality_id", "yarn_type_id", "percentage", "position"]),
        // Stock references are keyed by their legacy code; yarn_stock resolves
        // through the identifiers minted here. Tex has no destination column.
        TableMapping::new("Stock_Ref", "stock_ref")
            .field("Stock_Ref", "id")
            .field("Yarn_Code", "yarn_type_id")
            .field("Customer", "customer_id")
            .field("Stock", "quantity_in_stock")
            .field("Status", "status")
            .field("Date_Stamp", "date_added")
            .field("Yarn_Type", "notes")
            .transform("id", Transform::Identifier { reuse: true })
            .transform("yarn_type_id", Transform::foreign_key("yarn_types", false))
            .transform("customer_id", Transform::foreign_key("customers", true))
            .transform("quantity_in_stock", Transform::Decimal)
            .transform("status", text())
            .transform("date_added", Transform::Date)
            .transform("last_modified", Transform::Date)
            .transform("notes", text())
            .required(&["yarn_type_id", "quantity_in_stock", "status"]),
        TableMapping::new("Customer_Orders", "customer_orders")
            .field("Job_Card_No", "job_card_number")
            .field("Stock_Ref", "stock_reference")
            .field("Customer_Name", "customer_id")
            .field("Order_No", "order_number")
            .field("Date_Ord_Rcv", "order_date")
            .field("Quality_No", "quality_id")
            .field("Qty_Req", "quantity_required")
            .field("Actl_Mach", "machine_assigned")
            .field("Finish_Refer", "notes")
            .transform("id", id())
            .transform("job_card_number", text())
            .transform("stock_reference", text())
            .transform("customer_id", Transform::foreign_key("customers", true))
            .transform("order_number", text())
            .transform("order_date", Transform::Date)
            .transform("quality_id", Transform::foreign_key("fabric_quality", false))
            .transform("quantity_required", Transform::Decimal)
            .transform("machine_assigned", text())
            .transform("notes", text())
            .transform("status", text())
            .required(&[
                "job_card_number",
                "stock_reference",
                "customer_id",
                "order_date",
                "quality_id",
                "quantity_required",
                "status",
            ])
            .default_value("status", DefaultValue::Text("active".to_string())),
        TableMapping::new("Yarn_Stock", "yarn_stock")
            .field("Job_No", "job_card_id")
            .field("Stock", "stock_ref_id")
            .field("Rec", "quantity_received")
            .field("Loss", "quantity_loss")
            .field("Kgs", "quantity_used")
            .field("Stock_Date", "date_received")
            .field("Quality_No", "notes")
            .transform("id", id())
            .transform("job_card_id", Transform::foreign_key("customer_orders", false))
            .transform("stock_ref_id", Transform::foreign_key("stock_ref", false))
            .transform("quantity_received", Transform::Decimal)
            .transform("quantity_used", Transform::Decimal)
            .transform("quantity_loss", Transform::Decimal)
            .transform("date_received", Transform::Date)
            .transform("notes", text())
            .required(&["job_card_id", "stock_ref_id", "quantity_received", "date_received"]),
        TableMapping::new("Production_Information", "production_information")
            .field("Piece_No", "piece_number")
            .field("Job_Card_No", "job_card_id")
            .field("Weight", "weight")
            .field("SlipDate", "production_date")
            .field("SlipTime", "production_time")
            .field("Delivery_Note_No", "delivery_note_id")
            .field("Pack_Slip_No", "pack_info_id")
            .field("Delivery_Desc", "notes")
            .transform("id", id())
            .transform("piece_number", text())
            .transform("job_card_id", Transform::foreign_key("customer_orders", false))
            .transform("weight", Transform::Decimal)
            .transform("production_date", Transform::Date)
            .transform("production_time", Transform::Date)
            .transform("delivery_note_id", Transform::foreign_key("delivery_note", true))
            .transform("pack_info_id", Transform::foreign_key("pack_info", true))
            .transform("machine_number", text())
            .transform("operator_name", text())
            .transform("quality_grade", text())
            .transform("notes", text())
            .transform("archived", Transform::Boolean)
            .required(&["piece_number", "job_card_id", "weight", "production_date"]),
        TableMapping::new("Delivery_Note", "delivery_note")
            .field("Delivery_No", "delivery_number")
            .transform("id", id())
            .transform("delivery_number", text())
            .transform("customer_id", Transform::foreign_key("customers", true))
            .transform("delivery_date", Transform::Date)
            .transform("total_weight", Transform::Decimal)
            .transform("driver_name", text())
            .transform("vehicle_reg", text())
            .transform("notes", text())
            .required(&["delivery_number", "customer_id", "delivery_date"])
            .default_value("customer_id", DefaultValue::Null)
            .default_value("delivery_date", DefaultValue::Now),
        TableMapping::new("Pack_Info", "pack_info")
            .field("PackNo", "pack_slip_number")
            .field("Delivery_No", "delivery_note_id")
            .field("Total", "total_weight")
            .field("SlipDate", "pack_date")
            .transform("id", id())
            .transform("pack_slip_number", text())
            .transform("delivery_note_id", Transform::foreign_key("delivery_note", true))
            .transform("total_weight", Transform::Decimal)
            .transform("piece_count", Transform::Integer)
            .transform("pack_date", Transform::Date)
            .transform("notes", text())
            .required(&["pack_slip_number", "total_weight", "piece_count", "pack_date"])
            .default_value("piece_count", DefaultValue::Int(1)),
        TableMapping::new("UserLogs", "user_logs")
            .field("User_Name", "user_id")
            .field("Login_Time", "timestamp")
            .transform("id", id())
            .transform("user_id", Transform::foreign_key("users_by_name", false))
            .transform("action", text())
            .transform("timestamp", Transform::Date)
            .transform("ip_address", text())
            .transform("metadata", Transform::Json)
            .required(&["user_id", "action", "timestamp"])
            .default_value(
                "action",
                DefaultValue::ByPresence {
                    candidates: vec![
                        ("Login_Time".to_string(), "login".to_string()),
                        ("Logout_Time".to_string(), "logout".to_string()),
                    ],
                    otherwise: "unknown".to_string(),
                },
            ),
    ]
}
