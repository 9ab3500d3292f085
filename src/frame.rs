use crate::image::Image;
use crate::pyramid::Pyramid;

#[derive(Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn empty() -> Self {
        PyramidFrame {
            image: Image::empty(),
            pyramid: Pyramid::empty(),
        }
    }

    /// Copy `image` in and rebuild the pyramid, reusing the existing buffers.
    pub fn compute(&mut self, image: &Image, levels: usize) {
        self.image.data.clear();
        self.image.data.extend_from_slice(&image.data);
        self.image.width = image.width;
        self.image.height = image.height;
        self.pyramid.compute(&self.image, levels);
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len()
    }
}
