//! NGSI-LD core vocabulary used by the temporal subsystem.

pub const NGSILD_CORE: &str = "https://uri.etsi.org/ngsi-ld/";
pub const NGSILD_DEFAULT_VOCAB: &str = "https://uri.etsi.org/ngsi-ld/default-context/";

pub const JSONLD_ID: &str = "@id";
pub const JSONLD_TYPE: &str = "@type";
pub const JSONLD_VALUE: &str = "@value";
pub const JSONLD_LIST: &str = "@list";
pub const JSONLD_JSON: &str = "@json";
pub const JSONLD_CONTEXT: &str = "@context";
pub const JSONLD_VOCAB: &str = "@vocab";

pub const NGSILD_PROPERTY_TYPE: &str = "https://uri.etsi.org/ngsi-ld/Property";
pub const NGSILD_RELATIONSHIP_TYPE: &str = "https://uri.etsi.org/ngsi-ld/Relationship";
pub const NGSILD_DATE_TIME_TYPE: &str = "https://uri.etsi.org/ngsi-ld/DateTime";

pub const NGSILD_PROPERTY_VALUE: &str = "https://uri.etsi.org/ngsi-ld/hasValue";
pub const NGSILD_PROPERTY_VALUES: &str = "https://uri.etsi.org/ngsi-ld/hasValues";
pub const NGSILD_RELATIONSHIP_OBJECT: &str = "https://uri.etsi.org/ngsi-ld/hasObject";
pub const NGSILD_OBSERVED_AT_PROPERTY: &str = "https://uri.etsi.org/ngsi-ld/observedAt";
pub const NGSILD_CREATED_AT_PROPERTY: &str = "https://uri.etsi.org/ngsi-ld/createdAt";
pub const NGSILD_MODIFIED_AT_PROPERTY: &str = "https://uri.etsi.org/ngsi-ld/modifiedAt";
pub const NGSILD_DATASET_ID_PROPERTY: &str = "https://uri.etsi.org/ngsi-ld/datasetId";
pub const NGSILD_UNIT_CODE_PROPERTY: &str = "https://uri.etsi.org/ngsi-ld/unitCode";

/// Compact terms of the core context and their expanded IRIs.
pub const CORE_TERMS: &[(&str, &str)] = &[
    ("Property", NGSILD_PROPERTY_TYPE),
    ("Relationship", NGSILD_RELATIONSHIP_TYPE),
    ("DateTime", NGSILD_DATE_TIME_TYPE),
    ("value", NGSILD_PROPERTY_VALUE),
    ("values", NGSILD_PROPERTY_VALUES),
    ("object", NGSILD_RELATIONSHIP_OBJECT),
    ("observedAt", NGSILD_OBSERVED_AT_PROPERTY),
    ("createdAt", NGSILD_CREATED_AT_PROPERTY),
    ("modifiedAt", NGSILD_MODIFIED_AT_PROPERTY),
    ("datasetId", NGSILD_DATASET_ID_PROPERTY),
    ("unitCode", NGSILD_UNIT_CODE_PROPERTY),
];

/// Members whose expanded values are `DateTime` typed literals.
pub const DATE_TIME_PROPERTIES: &[&str] = &[
    NGSILD_OBSERVED_AT_PROPERTY,
    NGSILD_CREATED_AT_PROPERTY,
    NGSILD_MODIFIED_AT_PROPERTY,
];

/// Members whose expanded values are node references (`{"@id": ...}`).
pub const REFERENCE_PROPERTIES: &[&str] = &[NGSILD_RELATIONSHIP_OBJECT, NGSILD_DATASET_ID_PROPERTY];
