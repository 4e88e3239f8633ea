#[cfg(test)]
mod tests {
    use rusty_glasses::anchor::ArModel;
    use rusty_glasses::ar_config::ArConfig;
    use rusty_glasses::catalog::{JsonCatalog, ProductArConfig, ProductRecord};
    use rusty_glasses::scene::SceneParams;
    use rusty_glasses::template::TemplateStore;
    use serde_json::{json, Value};

    fn flat_config() -> Value {
        json!({
            "frontParams": { "x": 0.0, "y": 0.05, "scale": 1.1 },
            "leftParams": {
                "x": 0.05, "y": 0.0, "scale": 0.8,
                "anchorFrame": { "x": -0.5, "y": 0.0 },
                "anchorEar": { "x": 0.0, "y": 0.0 }
            },
            "rightParams": {
                "x": -0.05, "y": 0.0, "scale": 0.8,
                "anchorFrame": { "x": 0.5, "y": 0.0 },
                "anchorEar": { "x": 0.0, "y": 0.0 }
            },
            "autoAnchors": true
        })
    }

    fn catalog_with(dir: &std::path::Path, ar_config: Value) -> JsonCatalog {
        let catalog = JsonCatalog::open(dir).unwrap();
        catalog
            .save(&ProductRecord { id: "frame-01".into(), ar_config: Some(ar_config), ..ProductRecord::default() })
            .unwrap();
        catalog
    }

    #[test]
    fn stored_config_reads_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_with(dir.path(), flat_config());

        let input = catalog.load("frame-01").unwrap().ar().flat.unwrap();
        let mut model = ArModel::default();
        let pending = model.apply_config(&input);
        assert!(pending.is_empty());

        let output = model.get_config();
        assert_eq!(output, input);
    }

    #[test]
    fn stringified_slot_is_still_understood() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_with(dir.path(), Value::String(flat_config().to_string()));
        let ar = catalog.load("frame-01").unwrap().ar();
        assert_eq!(ar.flat, ArConfig::from_value(&flat_config()));
        assert!(ar.scene.is_none());
    }

    #[test]
    fn saving_scene_keeps_the_flat_config() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_with(dir.path(), flat_config());

        let mut ar = catalog.load("frame-01").unwrap().ar();
        ar.scene = Some(SceneParams { opening_angle: 12.0, ..SceneParams::default() });
        ar.temple_url = Some("https://cdn.example.com/temple.png".into());
        catalog.update_ar_config("frame-01", ar.to_value().unwrap()).unwrap();

        let back = catalog.load("frame-01").unwrap().ar();
        assert_eq!(back, ar);
        assert_eq!(back.scene.unwrap().opening_angle, 12.0);
    }

    #[test]
    fn template_starts_a_new_product() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());

        let mut tuned = ArModel::default();
        tuned.apply_config(&ArConfig::from_value(&flat_config()).unwrap());
        store.save_ar(&tuned.params()).unwrap();

        let mut fresh = ArModel::default();
        fresh.apply_params(&store.load_ar().unwrap().unwrap());
        assert_eq!(fresh.params(), tuned.params());
        assert!(fresh.get_config().front.is_none());
    }

    #[test]
    fn empty_slot_has_nothing_to_apply() {
        let record = ProductRecord { id: "bare".into(), ..ProductRecord::default() };
        assert!(record.ar().is_empty());
        assert_eq!(ProductArConfig::from_value(&json!({ "unrelated": 1 })), ProductArConfig::default());
    }
}
