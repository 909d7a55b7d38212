mod archiving;
