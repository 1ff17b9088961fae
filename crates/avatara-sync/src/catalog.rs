//! Asset catalog - furniture and skybox records by id

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use avatara_core::{AssetId, AvataraError, AvataraResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Furniture,
    Skybox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub path: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    #[serde(default)]
    pub name: String,
}

impl AssetRecord {
    pub fn new(id: impl Into<String>, kind: AssetKind, path: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: AssetId(id),
            path: path.into(),
            thumbnail: String::new(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    records: HashMap<AssetId, AssetRecord>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of records
    pub fn from_json(json: &str) -> AvataraResult<Self> {
        let records: Vec<AssetRecord> = serde_json::from_str(json)
            .map_err(|e| AvataraError::Config(format!("asset catalog: {}", e)))?;
        Ok(records.into_iter().collect())
    }

    pub fn insert(&mut self, record: AssetRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &AssetId) -> Option<&AssetRecord> {
        self.records.get(id)
    }

    pub fn require(&self, id: &AssetId) -> AvataraResult<&AssetRecord> {
        self.get(id)
            .ok_or_else(|| AvataraError::UnknownAsset(id.to_string()))
    }

    pub fn of_kind(&self, kind: AssetKind) -> impl Iterator<Item = &AssetRecord> {
        self.records.values().filter(move |r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<AssetRecord> for AssetCatalog {
    fn from_iter<I: IntoIterator<Item = AssetRecord>>(iter: I) -> Self {
        let mut catalog = AssetCatalog::new();
        for record in iter {
            catalog.insert(record);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_from_json() {
        let catalog = AssetCatalog::from_json(
            r#"[
                {"id": "sofa", "path": "/assets/sofa.glb", "thumbnail": "/thumbs/sofa.png", "type": "furniture", "name": "Sofa"},
                {"id": "sunset", "path": "/skyboxes/sunset.env", "type": "skybox"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.of_kind(AssetKind::Skybox).count(), 1);
        assert_eq!(catalog.require(&AssetId::new("sofa")).unwrap().name, "Sofa");
        assert!(matches!(
            catalog.require(&AssetId::new("lamp")),
            Err(AvataraError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_bad_catalog_is_config_error() {
        let err = AssetCatalog::from_json(r#"[{"id": "x"}]"#).unwrap_err();
        assert!(matches!(err, AvataraError::Config(_)));
    }
}
