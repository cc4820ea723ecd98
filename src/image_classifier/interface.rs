use image::DynamicImage;

/// Raw model output, one entry per label in `Config::labels` order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutput {
    Probabilities(Vec<f32>),
    Logits(Vec<f32>),
}

pub trait ImageClassifier {
    fn classify(
        &self,
        image: &DynamicImage,
    ) -> Result<ClassifierOutput, Box<dyn std::error::Error + Send + Sync>>;
}
