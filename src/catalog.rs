//! Static catalogs for formula-authoring tools

use serde::Serialize;

/// Kind of value a known field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Date,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Number => write!(f, "number"),
            FieldKind::Date => write!(f, "date"),
        }
    }
}

/// A record field formulas commonly reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// A ready-made formula shown to authors
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExampleFormula {
    pub name: &'static str,
    pub formula: &'static str,
    pub description: &'static str,
}

const FIELDS: &[FieldInfo] = &[
    FieldInfo {
        name: "monthlyRate",
        kind: FieldKind::Number,
        description: "Recurring monthly amount billed",
    },
    FieldInfo {
        name: "hourlyRate",
        kind: FieldKind::Number,
        description: "Rate charged per hour",
    },
    FieldInfo {
        name: "hoursWorked",
        kind: FieldKind::Number,
        description: "Hours logged in the period",
    },
    FieldInfo {
        name: "quantity",
        kind: FieldKind::Number,
        description: "Number of units",
    },
    FieldInfo {
        name: "unitPrice",
        kind: FieldKind::Number,
        description: "Price of a single unit",
    },
    FieldInfo {
        name: "cost",
        kind: FieldKind::Number,
        description: "Direct cost of the item",
    },
    FieldInfo {
        name: "revenue",
        kind: FieldKind::Number,
        description: "Revenue attributed to the record",
    },
    FieldInfo {
        name: "discount",
        kind: FieldKind::Number,
        description: "Discount as a fraction (0.1 = 10%)",
    },
    FieldInfo {
        name: "taxRate",
        kind: FieldKind::Number,
        description: "Tax rate as a fraction",
    },
    FieldInfo {
        name: "startDate",
        kind: FieldKind::Date,
        description: "Start of the period (epoch milliseconds)",
    },
    FieldInfo {
        name: "endDate",
        kind: FieldKind::Date,
        description: "End of the period (epoch milliseconds)",
    },
    FieldInfo {
        name: "createdAt",
        kind: FieldKind::Date,
        description: "When the record was created (epoch milliseconds)",
    },
];

const EXAMPLES: &[ExampleFormula] = &[
    ExampleFormula {
        name: "Marked-up rate",
        formula: "{monthlyRate} * 1.15",
        description: "Monthly rate with a 15% markup",
    },
    ExampleFormula {
        name: "Billable amount",
        formula: "{hourlyRate} * {hoursWorked}",
        description: "Hours worked times the hourly rate",
    },
    ExampleFormula {
        name: "Net sale",
        formula: "{quantity} * {unitPrice} * (1 - {discount})",
        description: "Line total after discount",
    },
    ExampleFormula {
        name: "Gross margin",
        formula: "{revenue} - {cost}",
        description: "Revenue minus direct cost",
    },
    ExampleFormula {
        name: "Margin percent",
        formula: "{revenue} > 0 ? ({revenue} - {cost}) / {revenue} * 100 : 0",
        description: "Margin as a percentage of revenue, 0 without revenue",
    },
    ExampleFormula {
        name: "Tax owed",
        formula: "round({revenue} * {taxRate}, 2)",
        description: "Tax on revenue, rounded to cents",
    },
    ExampleFormula {
        name: "Duration in days",
        formula: "max(0, ({endDate} - {startDate}) / 86400000)",
        description: "Days between start and end dates",
    },
    ExampleFormula {
        name: "Large deals",
        formula: "if({revenue} >= 10000, 1, 0)",
        description: "Counts records with revenue of at least 10,000",
    },
];

/// Known record fields, in display order
pub fn available_fields() -> &'static [FieldInfo] {
    FIELDS
}

/// Example formulas, in display order
pub fn example_formulas() -> &'static [ExampleFormula] {
    EXAMPLES
}
