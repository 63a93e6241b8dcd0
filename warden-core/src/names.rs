//! Well-known field names shared by the storage and access layers.

pub const FIELD_ID: &str = "id";
pub const FIELD_URN: &str = "urn";
pub const FIELD_OBJECT_ID: &str = "objectId";
pub const FIELD_NAME: &str = "name";
pub const FIELD_OWNER_ID: &str = "ownerId";
pub const FIELD_ORGANIZATION_ID: &str = "organizationId";
pub const FIELD_PARENT_ID: &str = "parentId";
pub const FIELD_GROUP_ID: &str = "groupId";
pub const FIELD_TYPE: &str = "type";
